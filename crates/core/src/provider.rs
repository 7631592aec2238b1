//! Provider trait, the abstraction over LLM backends.
//!
//! A provider streams a chat completion as a sequence of [`StreamChunk`]s.
//! Chunks carry text deltas and raw tool-call fragments; assembling the
//! fragments into complete calls is the caller's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// How strongly the model is steered towards the offered tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// The model decides.
    #[default]
    Auto,
    /// The model must call some tool.
    Required,
    /// The model must call this tool.
    Function(String),
}

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub model: String,

    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Ignored when `tools` is empty
    #[serde(default)]
    pub tool_choice: ToolChoice,
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One fragment of a streamed tool call, keyed by its slot index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// A piece of the JSON argument text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_deltas: Vec<ToolCallDelta>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn tool_fragment(delta: ToolCallDelta) -> Self {
        Self {
            tool_call_deltas: vec![delta],
            ..Self::default()
        }
    }

    pub fn finished() -> Self {
        Self {
            done: true,
            ..Self::default()
        }
    }
}

pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// One implementation per wire protocol, chosen by configuration at startup.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g. "openai", "ollama").
    fn name(&self) -> &str;

    /// Fails with [`ProviderError::NotConfigured`] when the provider cannot
    /// possibly serve a request, such as a hosted API without a key.
    fn check_credentials(&self) -> std::result::Result<(), ProviderError> {
        Ok(())
    }

    /// Send a request and get a stream of response chunks.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ChunkReceiver, ProviderError>;

    /// Embed each input text, returning vectors in input order.
    async fn embed(
        &self,
        _model: &str,
        _inputs: Vec<String>,
    ) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "Provider '{}' does not support embeddings",
            self.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_choice_defaults_to_auto() {
        let req: ProviderRequest =
            serde_json::from_str(r#"{"model":"gpt-5-mini","messages":[]}"#).unwrap();
        assert_eq!(req.tool_choice, ToolChoice::Auto);
        assert!(req.temperature.is_none());
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "export_pdf".into(),
            description: "Save a PDF".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "title": { "type": "string" } },
                "required": ["title"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("export_pdf"));
        assert!(json.contains("title"));
    }

    struct Silent;

    #[async_trait]
    impl Provider for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn stream(&self, _: ProviderRequest) -> std::result::Result<ChunkReceiver, ProviderError> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn embeddings_unsupported_by_default() {
        let err = Silent.embed("m", vec!["x".into()]).await.unwrap_err();
        assert!(err.to_string().contains("silent"));
        assert!(Silent.check_credentials().is_ok());
    }
}
