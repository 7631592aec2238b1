//! The streaming tool loop.
//!
//! One chat turn runs as a background task that talks to the caller only
//! through a bounded channel of [`ChatEvent`]s:
//!
//! ```text
//! credentials ─► history/user turn ─► retrieval ─► system prelude
//!     └─► round 0..max_rounds:
//!            stream provider ─► token events + tool-call fragments
//!            no calls   ─► (forced tool written as text? run it once) ─► stop
//!            disallowed ─► error event + rejected exchange ─► next round
//!            allowed    ─► dispatch first call ─► tool event + exchange ─► next round
//!     └─► sources ─► done
//! ```
//!
//! `done` is sent by an outer task after the flow task has finished, so it is
//! always last and sent exactly once, even when the flow panics.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use studiobot_core::error::ProviderError;
use studiobot_core::knowledge::{RetrievalQuery, RetrievedChunk, Retriever, Scope};
use studiobot_core::message::{Message, Role};
use studiobot_core::provider::{Provider, ProviderRequest, ToolChoice};
use studiobot_core::tool::{ToolOutcome, ToolRegistry};
use studiobot_memory::HistoryStore;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::accumulator::{PendingToolCall, ToolCallAccumulator};
use crate::context::ContextAssembler;
use crate::fallback::extract_text_call;
use crate::stream_event::{ChatEvent, group_sources};
use crate::trigger::{self, TriggerDecision};

const MAX_TOP_K: usize = 20;
const UNKNOWN_TOOL: &str = "unknown_tool";

/// Retrieval knobs a client may send with a turn.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    pub top_k: Option<usize>,
    pub source_id: Option<String>,
    pub agent_id: Option<String>,
    pub agent_ids: Option<Vec<String>>,
    pub scope: Scope,
}

/// One chat request.
///
/// A non-empty `message` uses the agent's stored history; otherwise the
/// client's `messages` are sent verbatim and history is left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatTurn {
    pub agent: Option<String>,
    pub model: Option<String>,
    pub message: Option<String>,
    pub messages: Vec<Message>,
    pub rag: RetrievalOptions,
    pub project_key: Option<String>,
}

impl ChatTurn {
    pub fn from_message(agent: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            agent: agent.map(String::from),
            message: Some(message.into()),
            ..Self::default()
        }
    }

    fn tracked_message(&self) -> Option<&str> {
        self.message.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }

    /// The utterance used for retrieval and the tool trigger.
    fn latest_utterance(&self) -> String {
        match self.tracked_message() {
            Some(message) => message.to_string(),
            None => self
                .messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_model: String,
    pub temperature: Option<f32>,
    pub max_rounds: usize,
    pub default_top_k: usize,
    pub channel_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_model: "gpt-5-mini".into(),
            temperature: None,
            max_rounds: 3,
            default_top_k: 6,
            channel_capacity: 256,
        }
    }
}

/// Why a flow ended early.
#[derive(Debug)]
enum FlowStop {
    /// The receiver is gone; nothing more can be delivered.
    ClientGone,
    Failed(String),
}

impl From<ProviderError> for FlowStop {
    fn from(e: ProviderError) -> Self {
        FlowStop::Failed(e.to_string())
    }
}

/// Sending half of a flow; a failed send means the client disconnected.
struct EventSink {
    tx: mpsc::Sender<ChatEvent>,
}

impl EventSink {
    async fn send(&self, event: ChatEvent) -> Result<(), FlowStop> {
        self.tx.send(event).await.map_err(|_| FlowStop::ClientGone)
    }

    fn ensure_open(&self) -> Result<(), FlowStop> {
        if self.tx.is_closed() {
            Err(FlowStop::ClientGone)
        } else {
            Ok(())
        }
    }
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    history: Arc<HistoryStore>,
    assembler: Arc<ContextAssembler>,
    retriever: Option<Arc<dyn Retriever>>,
    settings: OrchestratorSettings,
}

impl ChatOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
        history: Arc<HistoryStore>,
        assembler: Arc<ContextAssembler>,
    ) -> Self {
        Self {
            provider,
            tools,
            history,
            assembler,
            retriever: None,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Canonical agent id for a client-supplied identifier.
    pub fn normalize_agent(&self, raw: Option<&str>) -> String {
        self.assembler.personas().normalize(raw)
    }

    /// Start a turn. Events arrive on the returned receiver; dropping it
    /// abandons the turn before the next provider call or tool dispatch.
    pub fn run_stream(&self, turn: ChatTurn) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let this = self.clone();
        let sink = EventSink { tx: tx.clone() };

        tokio::spawn(async move {
            let flow = tokio::spawn(async move { this.run_flow(turn, &sink).await });
            let failure = match flow.await {
                Ok(Ok(())) | Ok(Err(FlowStop::ClientGone)) => None,
                Ok(Err(FlowStop::Failed(message))) => Some(message),
                Err(join_error) => {
                    error!(error = %join_error, "Chat flow aborted");
                    Some("Internal error while generating the response.".to_string())
                }
            };
            if let Some(message) = failure {
                let _ = tx.send(ChatEvent::Error(message)).await;
            }
            let _ = tx.send(ChatEvent::Done).await;
        });
        rx
    }

    async fn retrieve(&self, turn: &ChatTurn, agent_id: &str, utterance: &str) -> Vec<RetrievedChunk> {
        let Some(retriever) = &self.retriever else {
            return Vec::new();
        };
        if utterance.trim().is_empty() {
            return Vec::new();
        }
        let rag = &turn.rag;
        let agent_ids = match rag.agent_ids.as_ref().filter(|ids| !ids.is_empty()) {
            Some(ids) => ids.clone(),
            None => vec![rag.agent_id.clone().unwrap_or_else(|| agent_id.to_string())],
        };
        let query = RetrievalQuery {
            query: utterance.to_string(),
            top_k: rag.top_k.unwrap_or(self.settings.default_top_k).clamp(1, MAX_TOP_K),
            source_id: rag.source_id.clone(),
            agent_ids,
            scope: rag.scope,
            project_key: turn.project_key.clone(),
        };
        match retriever.retrieve(&query).await {
            Ok(chunks) => {
                debug!(count = chunks.len(), "Retrieved context");
                chunks
            }
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    fn tool_choice(&self, round: usize, decision: TriggerDecision) -> (bool, ToolChoice) {
        let offer = decision.might_need_tools || decision.forced_tool.is_some() || round > 0;
        let choice = match (round, decision.forced_tool) {
            (0, Some(tool)) if self.tools.is_allowed(tool) => ToolChoice::Function(tool.to_string()),
            (0, Some(_)) => ToolChoice::Required,
            (0, None) if decision.might_need_tools => ToolChoice::Required,
            _ => ToolChoice::Auto,
        };
        (offer, choice)
    }

    async fn run_flow(&self, turn: ChatTurn, sink: &EventSink) -> Result<(), FlowStop> {
        self.provider.check_credentials()?;

        let agent_id = self.normalize_agent(turn.agent.as_deref());
        let tracked = turn.tracked_message().map(String::from);
        let base_messages = match &tracked {
            Some(message) => {
                self.history.append_user(&agent_id, message).await;
                self.history.read(&agent_id).await
            }
            None => turn.messages.clone(),
        };

        let utterance = turn.latest_utterance();
        let chunks = self.retrieve(&turn, &agent_id, &utterance).await;
        let decision = trigger::evaluate(&utterance);
        let model = turn
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_model.clone());
        info!(
            agent = %agent_id,
            model = %model,
            tracked = tracked.is_some(),
            chunks = chunks.len(),
            forced_tool = decision.forced_tool.unwrap_or("-"),
            "Chat turn started"
        );

        let mut pending = self
            .assembler
            .assemble(&agent_id, &chunks, turn.project_key.as_deref());
        pending.extend(base_messages);

        for round in 0..self.settings.max_rounds {
            sink.ensure_open()?;
            let (offer_tools, tool_choice) = self.tool_choice(round, decision);
            let request = ProviderRequest {
                model: model.clone(),
                messages: pending.clone(),
                temperature: self.settings.temperature,
                tools: if offer_tools { self.tools.definitions() } else { Vec::new() },
                tool_choice,
            };

            let mut stream = self.provider.stream(request).await?;
            let mut text = String::new();
            let mut calls = ToolCallAccumulator::new();
            while let Some(item) = stream.recv().await {
                let chunk = item?;
                if let Some(fragment) = chunk.content.filter(|t| !t.is_empty()) {
                    text.push_str(&fragment);
                    sink.send(ChatEvent::Token(fragment)).await?;
                }
                for delta in &chunk.tool_call_deltas {
                    calls.merge(delta);
                }
                if chunk.done {
                    break;
                }
            }

            let assistant_text = text.trim().to_string();
            if tracked.is_some() {
                self.history.append_assistant(&agent_id, &assistant_text).await;
            }

            let calls = calls.finish();
            if calls.is_empty() {
                if round == 0
                    && let Some(forced) = decision.forced_tool
                    && let Some(arguments) = extract_text_call(&text, forced)
                {
                    info!(tool = forced, "Recovered tool call from text");
                    sink.ensure_open()?;
                    let outcome = self.tools.dispatch(forced, &arguments).await;
                    sink.send(tool_event(&outcome)).await?;
                }
                break;
            }

            match calls.iter().find(|c| self.tools.is_allowed(&c.name)) {
                Some(call) => {
                    sink.ensure_open()?;
                    info!(tool = %call.name, round, "Dispatching tool call");
                    let outcome = self.tools.dispatch(&call.name, call.arguments_or_empty_object()).await;
                    sink.send(tool_event(&outcome)).await?;
                    push_exchange(&mut pending, &assistant_text, call, &call.name, outcome.content());
                }
                None => {
                    let first = &calls[0];
                    let name = if first.name.is_empty() { UNKNOWN_TOOL } else { first.name.as_str() };
                    let message = format!("Tool '{name}' is not allowed.");
                    warn!(tool = name, round, "Rejected tool call");
                    sink.send(ChatEvent::Error(message.clone())).await?;
                    push_exchange(
                        &mut pending,
                        &assistant_text,
                        first,
                        UNKNOWN_TOOL,
                        json!({ "error": message }).to_string(),
                    );
                }
            }
        }

        if !chunks.is_empty() {
            sink.send(ChatEvent::Sources(group_sources(&chunks))).await?;
        }
        Ok(())
    }
}

fn tool_event(outcome: &ToolOutcome) -> ChatEvent {
    ChatEvent::ToolResult {
        event: outcome.event.clone(),
        payload: outcome.payload.clone(),
    }
}

/// Append the assistant tool call and its response so the next round sees both.
fn push_exchange(
    pending: &mut Vec<Message>,
    assistant_text: &str,
    call: &PendingToolCall,
    fallback_id: &str,
    response: String,
) {
    let mut message_call = call.to_message_call(fallback_id);
    if message_call.name.is_empty() {
        message_call.name = UNKNOWN_TOOL.into();
    }
    let (id, name) = (message_call.id.clone(), message_call.name.clone());
    let mut assistant = Message::assistant_tool_call(message_call);
    assistant.content = assistant_text.to_string();
    pending.push(assistant);
    pending.push(Message::tool_result(id, name, response));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, multi_tool_round, text_round, tool_round};
    use async_trait::async_trait;
    use serde_json::Value;
    use studiobot_core::error::{KnowledgeError, ToolError};
    use studiobot_core::persona::PersonaSource;
    use studiobot_core::provider::{ChunkReceiver, StreamChunk};
    use studiobot_core::tool::Tool;

    struct NoPersona;

    impl PersonaSource for NoPersona {
        fn normalize(&self, raw: Option<&str>) -> String {
            raw.unwrap_or("creative_director").to_string()
        }
        fn persona_text(&self, _agent_id: &str) -> String {
            String::new()
        }
        fn persona_description(&self, _agent_id: &str) -> String {
            String::new()
        }
    }

    struct EchoTool {
        name: &'static str,
        event: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Echo arguments"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn event_name(&self) -> &str {
            self.event
        }
        async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
            if arguments.get("fail").is_some() {
                return Err(ToolError::failed(self.name, "disk full"));
            }
            Ok(json!({"ok": true, "args": arguments}))
        }
    }

    struct StaticRetriever(Result<Vec<RetrievedChunk>, ()>);

    #[async_trait]
    impl Retriever for StaticRetriever {
        async fn retrieve(&self, _query: &RetrievalQuery) -> Result<Vec<RetrievedChunk>, KnowledgeError> {
            self.0
                .clone()
                .map_err(|_| KnowledgeError::Storage("offline".into()))
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl Provider for PanickingProvider {
        fn name(&self) -> &str {
            "panicking"
        }
        async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            panic!("provider bug");
        }
    }

    fn registry() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool { name: "export_pdf", event: "pdf_saved" }));
        tools.register(Arc::new(EchoTool { name: "resize_image", event: "image_updated" }));
        tools
    }

    fn orchestrator(provider: Arc<dyn Provider>) -> ChatOrchestrator {
        let tools = registry();
        let assembler = Arc::new(ContextAssembler::new(Arc::new(NoPersona), tools.definitions()));
        ChatOrchestrator::new(provider, tools, Arc::new(HistoryStore::new(20)), assembler)
    }

    async fn collect(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn assert_done_last_once(events: &[ChatEvent]) {
        assert_eq!(events.iter().filter(|e| e.is_done()).count(), 1);
        assert!(events.last().unwrap().is_done());
    }

    fn chunk(title: &str) -> RetrievedChunk {
        RetrievedChunk {
            source_id: "src-1".into(),
            chunk_index: 0,
            content: "Dragons hoard gold.".into(),
            score: 0.8,
            title: title.into(),
        }
    }

    #[tokio::test]
    async fn plain_answer_streams_tokens_then_done() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_round(&["Hel", "lo"])]));
        let orch = orchestrator(provider.clone());
        let events = collect(orch.run_stream(ChatTurn::from_message(None, "hi there"))).await;

        assert_eq!(
            events,
            vec![ChatEvent::Token("Hel".into()), ChatEvent::Token("lo".into()), ChatEvent::Done]
        );
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].tool_choice, ToolChoice::Auto);

        let history = orch.history().read("creative_director").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hello");
    }

    #[tokio::test]
    async fn missing_credentials_short_circuit() {
        let provider = Arc::new(ScriptedProvider::without_credentials());
        let events = collect(orchestrator(provider.clone()).run_stream(ChatTurn::from_message(None, "hi"))).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ChatEvent::Error(m) if m.contains("Missing API key")));
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn forced_tool_runs_and_loops() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round("call_1", "export_pdf", &["{\"title\"", ":\"Plan\"}"]),
            text_round(&["Saved."]),
        ]));
        let orch = orchestrator(provider.clone());
        let events = collect(orch.run_stream(ChatTurn::from_message(None, "save this as pdf"))).await;

        assert_eq!(events.len(), 3);
        match &events[0] {
            ChatEvent::ToolResult { event, payload } => {
                assert_eq!(event, "pdf_saved");
                assert_eq!(payload["args"]["title"], "Plan");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(events[1], ChatEvent::Token("Saved.".into()));
        assert_done_last_once(&events);

        let requests = provider.requests();
        assert_eq!(requests[0].tool_choice, ToolChoice::Function("export_pdf".into()));
        assert_eq!(requests[1].tool_choice, ToolChoice::Auto);
        assert!(!requests[1].tools.is_empty());
        let tail = &requests[1].messages[requests[1].messages.len() - 2..];
        assert_eq!(tail[0].tool_calls[0].name, "export_pdf");
        assert_eq!(tail[1].role, Role::Tool);
        assert_eq!(tail[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn disallowed_tool_is_rejected_and_fed_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round("call_x", "shell", &["{}"]),
            text_round(&["Sorry."]),
        ]));
        let events = collect(orchestrator(provider.clone()).run_stream(ChatTurn::from_message(None, "hello"))).await;

        assert_eq!(events[0], ChatEvent::Error("Tool 'shell' is not allowed.".into()));
        assert_eq!(events[1], ChatEvent::Token("Sorry.".into()));
        assert_done_last_once(&events);

        let second = &provider.requests()[1];
        let feedback = second.messages.last().unwrap();
        assert_eq!(feedback.role, Role::Tool);
        assert!(feedback.content.contains("is not allowed"));
    }

    #[tokio::test]
    async fn only_first_allowed_call_runs() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            multi_tool_round(&[
                ("call_a", "export_pdf", "{\"title\":\"A\"}"),
                ("call_b", "resize_image", "{}"),
            ]),
            text_round(&["Done."]),
        ]));
        let events = collect(orchestrator(provider.clone()).run_stream(ChatTurn::from_message(None, "hello"))).await;

        let results: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ChatEvent::ToolResult { .. }))
            .collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], ChatEvent::ToolResult { event, .. } if event == "pdf_saved"));
        assert_done_last_once(&events);

        let second = &provider.requests()[1];
        let tail = &second.messages[second.messages.len() - 2..];
        assert_eq!(tail[0].tool_calls.len(), 1);
        assert_eq!(tail[0].tool_calls[0].id, "call_a");
        assert_eq!(tail[1].tool_call_id.as_deref(), Some("call_a"));
        assert!(
            second
                .messages
                .iter()
                .all(|m| m.tool_call_id.as_deref() != Some("call_b")
                    && m.tool_calls.iter().all(|c| c.id != "call_b"))
        );
    }

    #[tokio::test]
    async fn allowed_call_after_disallowed_runs() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            multi_tool_round(&[
                ("call_s", "shell", "{\"cmd\":\"ls\"}"),
                ("call_p", "export_pdf", "{\"title\":\"B\"}"),
            ]),
            text_round(&["Saved."]),
        ]));
        let events = collect(orchestrator(provider.clone()).run_stream(ChatTurn::from_message(None, "hello"))).await;

        assert!(!events.iter().any(|e| matches!(e, ChatEvent::Error(_))));
        match &events[0] {
            ChatEvent::ToolResult { event, payload } => {
                assert_eq!(event, "pdf_saved");
                assert_eq!(payload["args"]["title"], "B");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_done_last_once(&events);

        let second = &provider.requests()[1];
        assert_eq!(second.messages.last().unwrap().tool_call_id.as_deref(), Some("call_p"));
    }

    #[tokio::test]
    async fn tool_failure_is_contained() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round("call_1", "export_pdf", &["{\"fail\": true}"]),
            text_round(&["It failed."]),
        ]));
        let events = collect(orchestrator(provider.clone()).run_stream(ChatTurn::from_message(None, "export pdf"))).await;

        let tool_events: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ChatEvent::ToolResult { .. }))
            .collect();
        assert_eq!(tool_events.len(), 1);
        assert!(matches!(tool_events[0], ChatEvent::ToolResult { payload, .. } if payload["error"] == "disk full"));
        assert_eq!(events[1], ChatEvent::Token("It failed.".into()));
        assert_done_last_once(&events);
    }

    #[tokio::test]
    async fn rounds_are_bounded() {
        let round = || tool_round("c", "resize_image", &["{}"]);
        let provider = Arc::new(ScriptedProvider::new(vec![round(), round(), round(), round()]));
        let events = collect(orchestrator(provider.clone()).run_stream(ChatTurn::from_message(None, "resize it"))).await;

        assert_eq!(provider.requests().len(), 3);
        assert_eq!(events.len(), 4);
        assert_done_last_once(&events);
    }

    #[tokio::test]
    async fn forced_tool_recovered_from_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_round(&[
            "export_pdf({\"title\": ",
            "\"Notes\"})",
        ])]));
        let events = collect(orchestrator(provider.clone()).run_stream(ChatTurn::from_message(None, "export to pdf"))).await;

        assert!(matches!(&events[2], ChatEvent::ToolResult { event, .. } if event == "pdf_saved"));
        assert_done_last_once(&events);
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn sources_come_before_done() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_round(&["Answer"])]));
        let orch = orchestrator(provider.clone())
            .with_retriever(Arc::new(StaticRetriever(Ok(vec![chunk("Lore")]))));
        let events = collect(orch.run_stream(ChatTurn::from_message(None, "tell me about dragons"))).await;

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], ChatEvent::Sources(groups) if groups[0].title == "Lore"));
        let system = &provider.requests()[0].messages;
        assert!(system.iter().any(|m| m.content.starts_with("CONTEXT:\n")));
    }

    #[tokio::test]
    async fn retrieval_failure_is_ignored() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_round(&["ok"])]));
        let orch = orchestrator(provider).with_retriever(Arc::new(StaticRetriever(Err(()))));
        let events = collect(orch.run_stream(ChatTurn::from_message(None, "hi"))).await;
        assert_eq!(events, vec![ChatEvent::Token("ok".into()), ChatEvent::Done]);
    }

    #[tokio::test]
    async fn client_messages_leave_history_alone() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_round(&["ok"])]));
        let orch = orchestrator(provider.clone());
        let turn = ChatTurn {
            messages: vec![Message::user("first"), Message::assistant("reply"), Message::user("second")],
            ..ChatTurn::default()
        };
        collect(orch.run_stream(turn)).await;

        assert!(orch.history().read("creative_director").await.is_empty());
        let sent = &provider.requests()[0].messages;
        assert_eq!(sent.last().unwrap().content, "second");
    }

    #[tokio::test]
    async fn provider_error_mid_stream_reports_then_done() {
        let provider = Arc::new(ScriptedProvider::with_results(vec![vec![
            Ok(StreamChunk::text("par")),
            Err(ProviderError::StreamInterrupted("connection reset".into())),
        ]]));
        let events = collect(orchestrator(provider).run_stream(ChatTurn::from_message(None, "hi"))).await;
        assert_eq!(events[0], ChatEvent::Token("par".into()));
        assert!(matches!(&events[1], ChatEvent::Error(m) if m.contains("connection reset")));
        assert_done_last_once(&events);
    }

    #[tokio::test]
    async fn panic_in_flow_still_ends_with_done() {
        let events = collect(orchestrator(Arc::new(PanickingProvider)).run_stream(ChatTurn::from_message(None, "hi"))).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ChatEvent::Error(_)));
        assert_done_last_once(&events);
    }

    #[tokio::test]
    async fn dropped_receiver_stops_further_rounds() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round("c", "resize_image", &["{}"]),
            text_round(&["never"]),
        ]));
        let orch = orchestrator(provider.clone());
        drop(orch.run_stream(ChatTurn::from_message(None, "resize it")));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(provider.requests().len() <= 1);
    }
}
