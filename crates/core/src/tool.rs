//! Tool trait and the registry that doubles as allow-list and dispatch table.
//!
//! Only tools registered here can ever run. Each tool reports its outcome
//! under its own event name so clients can tell which operation finished.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "export_pdf").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Outward event name used to report this tool's outcome.
    fn event_name(&self) -> &str;

    /// Payload reported when execution fails.
    fn failure_payload(&self, message: &str) -> Value {
        json!({ "error": message })
    }

    /// Execute the tool with structured arguments.
    async fn execute(&self, arguments: Value) -> std::result::Result<Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// What one dispatch produced.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutcome {
    pub tool_name: String,
    pub event: String,
    pub payload: Value,
    pub success: bool,
}

impl ToolOutcome {
    /// The payload as the tool message content fed back to the model.
    pub fn content(&self) -> String {
        self.payload.to_string()
    }
}

/// Ordered registry of available tools.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(pos) => self.tools[pos] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Whether `name` is on the allow-list.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Tool definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run `name` with raw JSON argument text.
    ///
    /// Never fails: argument parse errors, tool errors and panics all become a
    /// failure payload under the tool's event name. The tool runs on its own
    /// task so a panic is confined to this call.
    pub async fn dispatch(&self, name: &str, raw_arguments: &str) -> ToolOutcome {
        let Some(tool) = self.get(name).cloned() else {
            let message = format!("Tool '{name}' is not allowed.");
            return ToolOutcome {
                tool_name: name.to_string(),
                event: "error".into(),
                payload: json!({ "error": message }),
                success: false,
            };
        };

        let result = match parse_arguments(raw_arguments) {
            Ok(arguments) => {
                debug!(tool = %name, "Dispatching tool");
                let task_tool = Arc::clone(&tool);
                match tokio::spawn(async move { task_tool.execute(arguments).await }).await {
                    Ok(result) => result,
                    Err(join_error) => Err(ToolError::Panicked(join_error.to_string())),
                }
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(payload) => ToolOutcome {
                tool_name: name.to_string(),
                event: tool.event_name().to_string(),
                payload,
                success: true,
            },
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                ToolOutcome {
                    tool_name: name.to_string(),
                    event: tool.event_name().to_string(),
                    payload: tool.failure_payload(&e.to_string()),
                    success: false,
                }
            }
        }
    }
}

/// Empty argument text means "no arguments".
fn parse_arguments(raw: &str) -> std::result::Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("Tool arguments are not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(ToolError::InvalidArguments(
            "Tool arguments must be a JSON object.".into(),
        ));
    }
    Ok(value)
}
