//! Chat orchestration: persona-aware prompt assembly and the streaming tool loop.
//!
//! A turn flows through [`ChatOrchestrator::run_stream`], which emits
//! [`ChatEvent`]s until a final `Done`. The supporting pieces are usable on
//! their own: the heuristic [`trigger`], the [`ToolCallAccumulator`] that
//! stitches streamed argument fragments, and the [`ContextAssembler`] that
//! builds the system prelude.

pub mod accumulator;
pub mod context;
pub mod fallback;
pub mod orchestrator;
pub mod persona;
pub mod stream_event;
pub mod trigger;

#[cfg(test)]
mod test_helpers;

pub use accumulator::{PendingToolCall, ToolCallAccumulator};
pub use context::{CONTEXT_PREFIX, ContextAssembler, context_block};
pub use fallback::extract_text_call;
pub use orchestrator::{ChatOrchestrator, ChatTurn, OrchestratorSettings, RetrievalOptions};
pub use persona::PersonaDirectory;
pub use stream_event::{ChatEvent, SourceGroup, group_sources, sse_frame};
pub use trigger::TriggerDecision;
