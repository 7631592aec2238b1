//! # studiobot core
//!
//! Domain types, traits, and error definitions shared by every studiobot crate.
//!
//! Subsystems are defined as traits here and implemented elsewhere:
//! - [`Provider`] streams chat completions and computes embeddings
//! - [`Tool`] is one invocable capability; [`ToolRegistry`] is the allow-list
//!   and dispatch table over them
//! - [`Retriever`] searches the knowledge base
//! - [`PersonaSource`] resolves agent identities to persona text

pub mod error;
pub mod knowledge;
pub mod message;
pub mod persona;
pub mod provider;
pub mod tool;

pub use error::{KnowledgeError, ProviderError, ToolError};
pub use knowledge::{RetrievalQuery, RetrievedChunk, Retriever, Scope};
pub use message::{Message, MessageToolCall, Role};
pub use persona::PersonaSource;
pub use provider::{
    Provider, ProviderRequest, StreamChunk, ToolCallDelta, ToolChoice, ToolDefinition,
};
pub use tool::{Tool, ToolOutcome, ToolRegistry};
