//! Image tools: generation through Leonardo (or a local placeholder) plus
//! resize, crop and format conversion of files already in the images folder.
//!
//! Image tools report failures as `{"operation", "error"}` so the client can
//! tell which in-flight operation failed.

pub mod edit;
pub mod generate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use studiobot_core::error::ToolError;
use studiobot_security::{
    IMAGE_EXTENSIONS, PathValidationError, resolve_within, sanitize_image_filename,
    validate_input_filename,
};

use crate::export::optional_str;
use crate::output::{OutputLayout, image_url};

pub use edit::{ConvertImageTool, CropImageTool, ResizeImageTool};
pub use generate::{GenerateImageTool, LeonardoClient};

/// Widths and heights the generation backend accepts.
pub const ALLOWED_DIMENSIONS: [u32; 10] = [672, 768, 832, 864, 896, 1024, 1152, 1184, 1248, 1344];
pub const MAX_IMAGES: u32 = 4;
pub const MAX_PROMPT_CHARS: usize = 1000;
const MAX_OUTPUT_NAME: usize = 120;

/// One written image as reported to the model and the client.
#[derive(Debug, Clone, Serialize)]
pub struct ImageReceipt {
    pub filename: String,
    pub url: String,
    pub path: String,
}

impl ImageReceipt {
    pub fn new(path: &Path, project_key: Option<&str>) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            url: image_url(&filename, project_key),
            path: path.display().to_string(),
            filename,
        }
    }
}

/// Failure payload shared by every image tool.
pub(crate) fn failure_payload(operation: &str, message: &str) -> Value {
    json!({ "operation": operation, "error": message })
}

/// Nearest allowed dimension.
pub fn snap_dimension(value: u32) -> u32 {
    ALLOWED_DIMENSIONS
        .iter()
        .copied()
        .min_by_key(|allowed| allowed.abs_diff(value))
        .unwrap_or(1024)
}

/// Collapse whitespace and cut to `limit` chars, preferring a sentence or
/// clause boundary in the last 40%.
pub fn shorten_prompt(prompt: &str, limit: usize) -> String {
    let collapsed = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= limit {
        return collapsed;
    }
    let cut: String = collapsed.chars().take(limit).collect();
    let floor = limit * 6 / 10;
    for sep in [". ", "; ", ", "] {
        if let Some(idx) = cut.rfind(sep)
            && cut[..idx].chars().count() > floor
        {
            return cut[..=idx].trim_end().to_string();
        }
    }
    cut.trim_end().to_string()
}

/// `<prefix>_<YYYYmmdd_HHMMSS>_<6 hex>.<ext>`
pub fn build_image_filename(prefix: &str, extension: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(6).collect();
    format!("{prefix}_{stamp}_{suffix}.{extension}")
}

/// Sanitised `output_filename` when supplied, else a generated name.
pub fn output_filename(explicit: Option<&str>, prefix: &str, extension: &str) -> String {
    let Some(explicit) = explicit else {
        return build_image_filename(prefix, extension);
    };
    let mut name = sanitize_image_filename(explicit);
    if name.is_empty() {
        name = "image".into();
    }
    if !name.contains('.') {
        name = format!("{name}.{extension}");
    }
    if name.chars().count() > MAX_OUTPUT_NAME {
        name = name.chars().take(MAX_OUTPUT_NAME).collect();
    }
    name
}

/// Images directory for a project, created on demand.
pub(crate) async fn images_dir(
    layout: &OutputLayout,
    tool_name: &str,
    project_key: Option<&str>,
) -> Result<PathBuf, ToolError> {
    let dir = layout
        .images_dir(project_key)
        .await
        .map_err(|e| ToolError::failed(tool_name, e.to_string()))?;
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ToolError::failed(tool_name, format!("Failed to create images folder: {e}")))?;
    Ok(dir)
}

/// Path of an existing input image inside `dir`.
pub(crate) fn locate_input(dir: &Path, tool_name: &str, name: Option<&str>) -> Result<PathBuf, ToolError> {
    let name = name.ok_or_else(|| ToolError::InvalidArguments("Filename is required.".into()))?;
    validate_input_filename(name, IMAGE_EXTENSIONS).map_err(|e| {
        ToolError::InvalidArguments(match e {
            PathValidationError::UnsupportedExtension { .. } => "Unsupported image format.".into(),
            _ => "Invalid filename.".into(),
        })
    })?;
    let path = resolve_within(dir, name.trim())
        .map_err(|_| ToolError::InvalidArguments("Invalid filename.".into()))?;
    if !path.is_file() {
        return Err(ToolError::failed(tool_name, "Input image not found."));
    }
    Ok(path)
}

pub(crate) fn output_path(dir: &Path, tool_name: &str, name: &str) -> Result<PathBuf, ToolError> {
    resolve_within(dir, name).map_err(|e| ToolError::failed(tool_name, e.to_string()))
}

/// Arguments every edit tool shares.
pub(crate) struct EditTarget {
    pub dir: PathBuf,
    pub input: PathBuf,
    pub output_name: Option<String>,
    pub project_key: Option<String>,
}

impl EditTarget {
    pub(crate) async fn from_args(
        layout: &Arc<OutputLayout>,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<Self, ToolError> {
        let project_key = optional_str(arguments, "project_key");
        let dir = images_dir(layout, tool_name, project_key.as_deref()).await?;
        let input_name = optional_str(arguments, "input_filename");
        let input = locate_input(&dir, tool_name, input_name.as_deref())?;
        Ok(Self {
            dir,
            input,
            output_name: optional_str(arguments, "output_filename"),
            project_key,
        })
    }
}

/// Integer argument, falling back to `default` when missing or not a number.
pub(crate) fn int_arg(arguments: &Value, key: &str, default: i64) -> i64 {
    arguments
        .get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(default)
}
