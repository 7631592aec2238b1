//! Retrieval contract between the chat flow and the knowledge base.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

/// Which partition of the knowledge base a query may see.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Sources not tied to any project.
    Generic,
    /// Sources tied to the query's project.
    Project,
    /// Both of the above.
    #[default]
    Hybrid,
}

/// One ranked chunk returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub source_id: String,
    /// Position of the chunk within its source
    pub chunk_index: usize,
    pub content: String,
    /// Higher is more relevant
    pub score: f32,
    pub title: String,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    pub query: String,
    pub top_k: usize,
    pub source_id: Option<String>,
    /// Empty means "any agent"
    pub agent_ids: Vec<String>,
    pub scope: Scope,
    pub project_key: Option<String>,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> std::result::Result<Vec<RetrievedChunk>, KnowledgeError>;
}
