//! In-process knowledge base.
//!
//! Sources are split into overlapping character windows, embedded through the
//! configured provider, and ranked against query embeddings by cosine
//! similarity. With a store path configured, every source and chunk is
//! appended to a JSONL file and reloaded on startup; corrupted lines are
//! skipped.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use studiobot_config::KnowledgeConfig;
use studiobot_core::error::KnowledgeError;
use studiobot_core::knowledge::{RetrievalQuery, RetrievedChunk, Retriever, Scope};
use studiobot_core::provider::Provider;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::pdf::{PdfUpload, extract_pdf_text};
use crate::vector::rank_by_similarity;

/// Texts embedded per provider call.
const EMBED_BATCH: usize = 64;

/// Split `text` into windows of `chunk_size` characters that overlap by
/// `overlap` characters. NUL characters become spaces; blank windows are
/// dropped.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, KnowledgeError> {
    if chunk_size <= overlap {
        return Err(KnowledgeError::InvalidInput(
            "chunk_size must be greater than overlap".into(),
        ));
    }
    let cleaned: Vec<char> = text.replace('\0', " ").trim().chars().collect();
    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < cleaned.len() {
        let end = (start + chunk_size).min(cleaned.len());
        let chunk: String = cleaned[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        start += step;
    }
    Ok(chunks)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: String,
    pub title: String,
    /// Empty means every agent may see it
    #[serde(default)]
    pub agent_ids: Vec<String>,
    /// None means generic knowledge
    #[serde(default)]
    pub project_key: Option<String>,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

impl SourceRecord {
    fn visible_to(&self, agent_ids: &[String]) -> bool {
        self.agent_ids.is_empty()
            || agent_ids.is_empty()
            || self.agent_ids.iter().any(|a| agent_ids.contains(a))
    }

    fn in_scope(&self, scope: Scope, project_key: Option<&str>) -> bool {
        let own = self.project_key.as_deref();
        match scope {
            Scope::Generic => own.is_none(),
            Scope::Project => own.is_some() && own == project_key,
            Scope::Hybrid => own.is_none() || (own.is_some() && own == project_key),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    source_id: String,
    chunk_index: usize,
    content: String,
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record {
    Source(SourceRecord),
    Chunk(StoredChunk),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub project_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source_id: String,
    pub title: String,
    pub chunks: usize,
}

#[derive(Default)]
struct KnowledgeState {
    sources: Vec<SourceRecord>,
    chunks: Vec<StoredChunk>,
}

pub struct KnowledgeBase {
    provider: Arc<dyn Provider>,
    embedding_model: String,
    chunk_size: usize,
    chunk_overlap: usize,
    store_path: Option<PathBuf>,
    state: RwLock<KnowledgeState>,
}

impl KnowledgeBase {
    pub fn new(
        provider: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
        config: &KnowledgeConfig,
    ) -> Self {
        let state = config
            .store_path
            .as_deref()
            .map(Self::load_from_disk)
            .unwrap_or_default();
        debug!(
            sources = state.sources.len(),
            chunks = state.chunks.len(),
            "Knowledge base loaded"
        );
        Self {
            provider,
            embedding_model: embedding_model.into(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            store_path: config.store_path.clone(),
            state: RwLock::new(state),
        }
    }

    fn load_from_disk(path: &Path) -> KnowledgeState {
        let mut state = KnowledgeState::default();
        let Ok(content) = std::fs::read_to_string(path) else {
            return state;
        };
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<Record>(line) {
                Ok(Record::Source(source)) => state.sources.push(source),
                Ok(Record::Chunk(chunk)) => state.chunks.push(chunk),
                Err(e) => warn!(error = %e, "Skipping corrupted knowledge record"),
            }
        }
        state
    }

    fn append_to_disk(&self, records: &[Record]) -> Result<(), KnowledgeError> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| KnowledgeError::Storage(format!("Failed to create store dir: {e}")))?;
        }
        let mut content = String::new();
        for record in records {
            let line = serde_json::to_string(record)
                .map_err(|e| KnowledgeError::Storage(format!("Failed to serialize record: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| KnowledgeError::Storage(format!("Failed to open store: {e}")))?;
        file.write_all(content.as_bytes())
            .map_err(|e| KnowledgeError::Storage(format!("Failed to write store: {e}")))
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH) {
            let embedded = self
                .provider
                .embed(&self.embedding_model, batch.to_vec())
                .await
                .map_err(|e| KnowledgeError::EmbeddingFailed(e.to_string()))?;
            if embedded.len() != batch.len() {
                return Err(KnowledgeError::EmbeddingFailed(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Chunk, embed and store one source.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport, KnowledgeError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(KnowledgeError::InvalidInput("title is required".into()));
        }
        let project_key = match request.project_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Some(
                studiobot_security::validate_project_key(key)
                    .map_err(|e| KnowledgeError::InvalidInput(e.to_string()))?,
            ),
            _ => None,
        };

        let pieces = chunk_text(&request.text, self.chunk_size, self.chunk_overlap)?;
        if pieces.is_empty() {
            return Err(KnowledgeError::InvalidInput("text is empty".into()));
        }
        let embeddings = self.embed_all(&pieces).await?;

        let source = SourceRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            agent_ids: request.agent_ids,
            project_key,
            chunk_count: pieces.len(),
            created_at: Utc::now(),
        };
        let chunks: Vec<StoredChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (content, embedding))| StoredChunk {
                source_id: source.id.clone(),
                chunk_index,
                content,
                embedding,
            })
            .collect();

        let report = IngestReport {
            source_id: source.id.clone(),
            title: source.title.clone(),
            chunks: chunks.len(),
        };

        let mut records = Vec::with_capacity(chunks.len() + 1);
        records.push(Record::Source(source.clone()));
        records.extend(chunks.iter().cloned().map(Record::Chunk));
        self.append_to_disk(&records)?;

        let mut state = self.state.write().await;
        state.sources.push(source);
        state.chunks.extend(chunks);
        info!(source = %report.source_id, chunks = report.chunks, "Source ingested");
        Ok(report)
    }

    /// Extract a PDF's text and ingest it like any other source.
    pub async fn ingest_pdf(&self, upload: PdfUpload) -> Result<IngestReport, KnowledgeError> {
        upload.check()?;
        let title = upload.source_title();
        let agent_ids = upload
            .agent_ids
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .map(String::from)
            .collect();

        let bytes = upload.bytes;
        let text = tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
            .await
            .map_err(|e| KnowledgeError::InvalidInput(format!("Failed to read PDF: {e}")))??;
        info!(file = %upload.filename, chars = text.len(), "PDF text extracted");

        self.ingest(IngestRequest {
            title,
            text,
            agent_ids,
            project_key: upload.project_key,
        })
        .await
    }

    /// Sources newest first.
    pub async fn sources(&self) -> Vec<SourceRecord> {
        let mut sources = self.state.read().await.sources.clone();
        sources.reverse();
        sources
    }
}

#[async_trait]
impl Retriever for KnowledgeBase {
    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedChunk>, KnowledgeError> {
        let text = query.query.trim();
        if text.is_empty() || query.top_k == 0 {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let visible: Vec<&SourceRecord> = state
            .sources
            .iter()
            .filter(|s| query.source_id.as_deref().is_none_or(|id| s.id == id))
            .filter(|s| s.visible_to(&query.agent_ids))
            .filter(|s| s.in_scope(query.scope, query.project_key.as_deref()))
            .collect();
        if visible.is_empty() {
            return Ok(Vec::new());
        }
        let candidates: Vec<(&[f32], (&StoredChunk, &SourceRecord))> = state
            .chunks
            .iter()
            .filter_map(|c| {
                let source = visible.iter().find(|s| s.id == c.source_id)?;
                Some((c.embedding.as_slice(), (c, *source)))
            })
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embed_all(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        Ok(rank_by_similarity(candidates, &query_embedding, query.top_k)
            .into_iter()
            .map(|(score, (chunk, source))| RetrievedChunk {
                source_id: chunk.source_id.clone(),
                chunk_index: chunk.chunk_index,
                content: chunk.content.clone(),
                score,
                title: source.title.clone(),
            })
            .collect())
    }
}
