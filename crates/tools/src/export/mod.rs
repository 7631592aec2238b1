//! Document exports: PDF, DOCX and XLSX files written into the documents
//! directory of the output layout.
//!
//! All three share argument checks, file naming and the receipt returned to
//! the model.

pub mod docx;
pub mod pdf;
pub mod xlsx;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::Serialize;
use serde_json::Value;
use studiobot_core::error::ToolError;
use studiobot_security::{resolve_within, sanitize_document_filename};

use crate::output::{OutputLayout, download_url};

pub use docx::ExportDocxTool;
pub use pdf::ExportPdfTool;
pub use xlsx::ExportXlsxTool;

const MAX_CONTENT_BYTES: usize = 2 * 1024 * 1024;

static DISALLOWED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\-_. ]+").ok());
static UNDERSCORES: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"_+").ok());

/// What a successful export reports back.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReceipt {
    pub ok: bool,
    pub filename: String,
    pub path: String,
    pub download_url: String,
}

/// Title, body and placement shared by the PDF and DOCX exports.
#[derive(Debug, Clone)]
pub struct DocumentArgs {
    pub title: String,
    pub content: String,
    pub filename: Option<String>,
    pub project_key: Option<String>,
}

/// Trimmed, non-empty string argument.
pub(crate) fn optional_str(arguments: &Value, key: &str) -> Option<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

pub(crate) fn required_str(arguments: &Value, key: &str) -> Result<String, ToolError> {
    optional_str(arguments, key)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Tool arg '{key}' is required.")))
}

impl DocumentArgs {
    pub fn from_value(arguments: &Value) -> Result<Self, ToolError> {
        let title = required_str(arguments, "title")?;
        let content = required_str(arguments, "content")?;
        if content.len() > MAX_CONTENT_BYTES {
            return Err(ToolError::InvalidArguments(
                "Tool arg 'content' exceeds 2MB limit.".into(),
            ));
        }
        Ok(Self {
            title,
            content,
            filename: optional_str(arguments, "filename"),
            project_key: optional_str(arguments, "project_key"),
        })
    }
}

/// `<slug>_<YYYY-MM-DD_HHMMSS>.<ext>` built from a title.
pub fn build_filename(title: &str, extension: &str, fallback: &str, now: DateTime<Utc>) -> String {
    let mut base = title.trim().to_lowercase().replace(' ', "_");
    if let Some(re) = DISALLOWED.as_ref() {
        base = re.replace_all(&base, "_").into_owned();
    }
    if let Some(re) = UNDERSCORES.as_ref() {
        base = re.replace_all(&base, "_").into_owned();
    }
    let base = match base.trim_matches('_') {
        "" => fallback,
        b => b,
    };
    let stamped = format!("{base}_{}", now.format("%Y-%m-%d_%H%M%S"));
    sanitize_document_filename(&stamped, extension).unwrap_or_else(|| format!("{fallback}.{extension}"))
}

/// Final on-disk name: the model's choice when given, else one built from the title.
pub fn choose_filename(explicit: Option<&str>, title: &str, extension: &str, fallback: &str) -> String {
    explicit
        .and_then(|name| sanitize_document_filename(name, extension))
        .unwrap_or_else(|| build_filename(title, extension, fallback, Utc::now()))
}

/// Create the documents directory for `project_key` and resolve `filename` inside it.
pub(crate) async fn prepare_target(
    layout: &OutputLayout,
    tool_name: &str,
    project_key: Option<&str>,
    filename: &str,
) -> Result<PathBuf, ToolError> {
    let dir = layout
        .documents_dir(project_key)
        .await
        .map_err(|e| ToolError::failed(tool_name, e.to_string()))?;
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ToolError::failed(tool_name, format!("Failed to create output folder: {e}")))?;
    resolve_within(&dir, filename).map_err(|e| ToolError::failed(tool_name, e.to_string()))
}

/// Run a blocking writer and turn its result into a receipt.
pub(crate) async fn write_blocking<F>(
    tool_name: &str,
    path: PathBuf,
    project_key: Option<&str>,
    writer: F,
) -> Result<Value, ToolError>
where
    F: FnOnce(&Path) -> Result<(), String> + Send + 'static,
{
    let target = path.clone();
    tokio::task::spawn_blocking(move || writer(&target))
        .await
        .map_err(|e| ToolError::failed(tool_name, format!("Export task failed: {e}")))?
        .map_err(|reason| ToolError::failed(tool_name, reason))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::info!(tool = tool_name, path = %path.display(), "Document exported");

    let receipt = ExportReceipt {
        ok: true,
        download_url: download_url(&filename, project_key),
        filename,
        path: path.display().to_string(),
    };
    serde_json::to_value(receipt).map_err(|e| ToolError::failed(tool_name, e.to_string()))
}
