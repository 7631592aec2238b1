//! Text extraction for uploaded PDFs.

use studiobot_core::error::KnowledgeError;
use tracing::debug;

/// An uploaded PDF plus the metadata that travels with it.
#[derive(Debug, Clone, Default)]
pub struct PdfUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// Falls back to the file name when blank.
    pub title: Option<String>,
    pub agent_ids: Vec<String>,
    pub project_key: Option<String>,
}

impl PdfUpload {
    /// Reject anything that is not a non-empty `.pdf` upload.
    pub fn check(&self) -> Result<(), KnowledgeError> {
        if !self.filename.trim().to_ascii_lowercase().ends_with(".pdf") {
            return Err(KnowledgeError::InvalidInput("Only PDF files are supported.".into()));
        }
        if self.bytes.is_empty() {
            return Err(KnowledgeError::InvalidInput("Empty upload.".into()));
        }
        Ok(())
    }

    pub fn source_title(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.filename.trim())
            .to_string()
    }
}

/// All text of a PDF, trimmed. A PDF without a text layer is an error.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String, KnowledgeError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| KnowledgeError::InvalidInput(format!("Failed to read PDF: {e}")))?;
    let text = text.trim();
    debug!(chars = text.len(), "Extracted PDF text");
    if text.is_empty() {
        return Err(KnowledgeError::InvalidInput("No text extracted from PDF.".into()));
    }
    Ok(text.to_string())
}
