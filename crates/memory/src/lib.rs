//! State stores for studiobot.
//!
//! - [`HistoryStore`]: bounded per-agent conversation history with an
//!   optional JSON snapshot per agent
//! - [`ProjectPaths`]: project key to folder map persisted as JSON
//! - [`KnowledgeBase`]: chunked, embedded documents searchable by cosine
//!   similarity; implements `studiobot_core::Retriever`
//! - [`PdfUpload`]: text extraction for PDFs fed to the knowledge base

pub mod history;
pub mod knowledge;
pub mod pdf;
pub mod projects;
pub mod vector;

pub use history::{HistorySnapshot, HistoryStore};
pub use knowledge::{IngestReport, IngestRequest, KnowledgeBase, SourceRecord, chunk_text};
pub use pdf::{PdfUpload, extract_pdf_text};
pub use projects::{ProjectPathError, ProjectPaths};
pub use vector::{cosine_similarity, rank_by_similarity};
