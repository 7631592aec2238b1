//! `generate_image`: text-to-image through the Leonardo REST API.
//!
//! Leonardo either answers with image URLs directly or with a generation id
//! that has to be polled on the v1 API. Without an API key the tool writes a
//! flat placeholder PNG so the rest of the flow can be exercised offline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{Value, json};
use studiobot_config::ImageConfig;
use studiobot_core::error::ToolError;
use studiobot_core::tool::Tool;
use tracing::{debug, info, warn};

use super::{
    ImageReceipt, MAX_IMAGES, MAX_PROMPT_CHARS, build_image_filename, failure_payload, images_dir,
    int_arg, output_path, shorten_prompt, snap_dimension,
};
use crate::export::optional_str;
use crate::output::OutputLayout;

const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";
const STYLE_ID: &str = "111dc692-d470-4eec-b791-3475abac4c46";
const PLACEHOLDER_COLOR: [u8; 3] = [30, 41, 59];
const MAX_SEARCH_DEPTH: usize = 6;

/// Generation parameters after defaults and clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub quantity: u32,
    pub seed: Option<i64>,
}

impl GenerationRequest {
    pub fn from_args(arguments: &Value, config: &ImageConfig) -> Result<Self, ToolError> {
        let raw = optional_str(arguments, "prompt")
            .ok_or_else(|| ToolError::InvalidArguments("Prompt is required.".into()))?;
        let style = config.style.trim();
        let prompt = if !style.is_empty() && !raw.to_lowercase().contains("style") {
            format!("{raw} Style: {style}.")
        } else {
            raw
        };

        let dimension = |key: &str, default: u32| {
            let value = int_arg(arguments, key, i64::from(default));
            snap_dimension(u32::try_from(value).unwrap_or(0))
        };
        let quantity = int_arg(arguments, "num_images", i64::from(config.num_images))
            .clamp(1, i64::from(MAX_IMAGES)) as u32;

        Ok(Self {
            prompt: shorten_prompt(&prompt, MAX_PROMPT_CHARS),
            negative_prompt: optional_str(arguments, "negative_prompt"),
            width: dimension("width", config.width),
            height: dimension("height", config.height),
            quantity,
            seed: arguments.get("seed").and_then(Value::as_i64),
        })
    }

    fn body(&self, model: &str) -> Value {
        let mut parameters = json!({
            "width": self.width,
            "height": self.height,
            "prompt": self.prompt,
            "quantity": self.quantity,
            "prompt_enhance": "OFF",
            "style_ids": [STYLE_ID],
        });
        if let Some(negative) = &self.negative_prompt {
            parameters["negative_prompt"] = json!(negative);
        }
        if let Some(seed) = self.seed {
            parameters["seed"] = json!(seed);
        }
        json!({ "model": model, "parameters": parameters, "public": false })
    }
}

/// URLs listed under any `images` or `generated_images` array.
pub fn collect_image_urls(payload: &Value) -> Vec<String> {
    fn walk(value: &Value, depth: usize, out: &mut Vec<String>) {
        if depth > MAX_SEARCH_DEPTH {
            return;
        }
        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    match (key.as_str(), child) {
                        ("images" | "generated_images", Value::Array(items)) => out.extend(
                            items
                                .iter()
                                .filter_map(|i| i.get("url").and_then(Value::as_str))
                                .filter(|u| !u.is_empty())
                                .map(String::from),
                        ),
                        _ => walk(child, depth + 1, out),
                    }
                }
            }
            Value::Array(items) => items.iter().for_each(|i| walk(i, depth + 1, out)),
            _ => {}
        }
    }
    let mut out = Vec::new();
    walk(payload, 0, &mut out);
    out
}

/// Generation id from `generate.generationId` or the first matching key found.
pub fn find_generation_id(payload: &Value) -> Option<String> {
    fn walk(value: &Value, depth: usize) -> Option<String> {
        if depth > MAX_SEARCH_DEPTH - 1 {
            return None;
        }
        match value {
            Value::Object(map) => ["generationId", "generation_id", "id"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str).map(String::from))
                .or_else(|| map.values().find_map(|v| walk(v, depth + 1))),
            Value::Array(items) => items.iter().find_map(|v| walk(v, depth + 1)),
            _ => None,
        }
    }
    payload
        .pointer("/generate/generationId")
        .and_then(Value::as_str)
        .map(String::from)
        .or_else(|| walk(payload, 0))
}

/// Human-readable reason from a Leonardo error body.
pub fn error_details(payload: &Value) -> String {
    match payload {
        Value::Object(map) => map
            .get("error")
            .or_else(|| map.get("detail"))
            .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
            .unwrap_or_else(|| payload.to_string()),
        Value::Array(items) => match items.first() {
            Some(first) => first
                .pointer("/extensions/details")
                .or_else(|| first.get("message"))
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| first.to_string()),
            None => payload.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Minimal Leonardo REST client.
pub struct LeonardoClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    poll_url: String,
    model: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl LeonardoClient {
    pub fn new(config: &ImageConfig, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: config.leonardo_base_url.trim_end_matches('/').to_string(),
            poll_url: config.leonardo_poll_url.trim_end_matches('/').to_string(),
            model: config.model_id.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(120),
        }
    }

    /// Start a generation and wait for its image URLs.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, String> {
        let response = self
            .http
            .post(format!("{}/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(&request.body(&self.model))
            .timeout(Duration::from_secs(120))
            .send()
            .await
            .map_err(|e| format!("Leonardo request failed: {e}"))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let data: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        let is_error_body = match &data {
            Value::Object(map) => ["error", "errors", "detail"].iter().any(|k| map.contains_key(*k)),
            Value::Array(_) => true,
            _ => false,
        };
        if !status.is_success() || is_error_body {
            warn!(status = %status, "Leonardo generation request rejected");
            return Err(format!("Leonardo request failed: {}", error_details(&data)));
        }

        let urls = collect_image_urls(&data);
        if !urls.is_empty() {
            return Ok(urls);
        }
        let generation_id = find_generation_id(&data).ok_or_else(|| {
            let keys = data
                .as_object()
                .map(|m| m.keys().cloned().collect::<Vec<_>>().join(", "))
                .unwrap_or_default();
            format!("Leonardo response missing generation id. Keys: [{keys}]")
        })?;
        self.poll(&generation_id).await
    }

    async fn poll(&self, generation_id: &str) -> Result<Vec<String>, String> {
        let url = format!("{}/generations/{generation_id}", self.poll_url);
        let started = tokio::time::Instant::now();
        debug!(generation_id, "Polling Leonardo generation");
        while started.elapsed() < self.poll_timeout {
            let data: Value = self
                .http
                .get(&url)
                .bearer_auth(&self.api_key)
                .timeout(Duration::from_secs(30))
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| format!("Leonardo status check failed: {e}"))?
                .json()
                .await
                .map_err(|e| format!("Leonardo status check failed: {e}"))?;
            let urls = collect_image_urls(&data);
            if !urls.is_empty() {
                return Ok(urls);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err("Leonardo generation timed out.".into())
    }

    pub async fn download(&self, url: &str) -> Result<Vec<u8>, String> {
        let bytes = self
            .http
            .get(url)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("Image download failed: {e}"))?
            .bytes()
            .await
            .map_err(|e| format!("Image download failed: {e}"))?;
        Ok(bytes.to_vec())
    }
}

pub struct GenerateImageTool {
    layout: Arc<OutputLayout>,
    config: ImageConfig,
    client: Option<LeonardoClient>,
}

impl GenerateImageTool {
    pub fn new(layout: Arc<OutputLayout>, config: ImageConfig) -> Self {
        let client = config
            .leonardo_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|key| LeonardoClient::new(&config, key.to_string()));
        Self {
            layout,
            config,
            client,
        }
    }

    async fn write_placeholder(&self, dir: PathBuf, request: &GenerationRequest) -> Result<PathBuf, ToolError> {
        let path = output_path(&dir, self.name(), &build_image_filename("leonardo_stub", "png"))?;
        let (width, height) = (request.width, request.height);
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            RgbImage::from_pixel(width, height, Rgb(PLACEHOLDER_COLOR))
                .save_with_format(&target, ImageFormat::Png)
        })
        .await
        .map_err(|e| ToolError::failed(self.name(), e.to_string()))?
        .map_err(|e| ToolError::failed(self.name(), format!("Failed to write placeholder: {e}")))?;
        Ok(path)
    }
}

/// Extension matching downloaded bytes; PNG when unknown.
fn extension_for(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "jpg",
        Ok(ImageFormat::WebP) => "webp",
        _ => "png",
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate a new image from a text prompt."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "description": "What the image should show" },
                "negative_prompt": { "type": "string", "description": "What to avoid" },
                "width": { "type": "integer", "description": "Width in pixels" },
                "height": { "type": "integer", "description": "Height in pixels" },
                "num_images": { "type": "integer", "minimum": 1, "maximum": MAX_IMAGES },
                "seed": { "type": "integer" },
                "project_key": { "type": "string", "description": "Project whose folder receives the images" }
            },
            "required": ["prompt"]
        })
    }

    fn event_name(&self) -> &str {
        "image_generated"
    }

    fn failure_payload(&self, message: &str) -> Value {
        failure_payload(self.name(), message)
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let request = GenerationRequest::from_args(&arguments, &self.config)?;
        let project_key = optional_str(&arguments, "project_key");
        let key = project_key.as_deref();
        let dir = images_dir(&self.layout, self.name(), key).await?;

        let mut images = Vec::new();
        match &self.client {
            None => {
                info!("No Leonardo API key configured, writing placeholder image");
                let path = self.write_placeholder(dir, &request).await?;
                images.push(ImageReceipt::new(&path, key));
            }
            Some(client) => {
                let urls = client
                    .generate(&request)
                    .await
                    .map_err(|reason| ToolError::failed(self.name(), reason))?;
                for (i, url) in urls.iter().take(request.quantity as usize).enumerate() {
                    let bytes = client
                        .download(url)
                        .await
                        .map_err(|reason| ToolError::failed(self.name(), reason))?;
                    let filename = build_image_filename(&format!("leonardo_{}", i + 1), extension_for(&bytes));
                    let path = output_path(&dir, self.name(), &filename)?;
                    tokio::fs::write(&path, &bytes)
                        .await
                        .map_err(|e| ToolError::failed(self.name(), format!("Failed to save image: {e}")))?;
                    images.push(ImageReceipt::new(&path, key));
                }
                info!(count = images.len(), "Leonardo images saved");
            }
        }

        Ok(json!({ "images": images, "prompt": request.prompt }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studiobot_config::OutputConfig;
    use studiobot_memory::ProjectPaths;
    use tempfile::TempDir;

    fn config() -> ImageConfig {
        ImageConfig {
            leonardo_api_key: None,
            ..ImageConfig::default()
        }
    }

    #[test]
    fn request_applies_style_and_defaults() {
        let request = GenerationRequest::from_args(&json!({"prompt": "a knight"}), &config()).unwrap();
        assert_eq!(request.prompt, "a knight Style: high resolution cartoon, movie style.");
        assert_eq!(request.width, 672);
        assert_eq!(request.height, 1248);
        assert_eq!(request.quantity, 2);
    }

    #[test]
    fn request_keeps_explicit_style_and_clamps_quantity() {
        let request = GenerationRequest::from_args(
            &json!({"prompt": "pixel art style castle", "num_images": 9, "width": 1024, "seed": 7}),
            &config(),
        )
        .unwrap();
        assert_eq!(request.prompt, "pixel art style castle");
        assert_eq!(request.quantity, 4);
        assert_eq!(request.width, 1024);
        assert_eq!(request.body(DEFAULT_MODEL)["parameters"]["seed"], 7);
    }

    #[test]
    fn prompt_is_required() {
        let err = GenerationRequest::from_args(&json!({"prompt": " "}), &config()).unwrap_err();
        assert_eq!(err.to_string(), "Prompt is required.");
    }

    #[test]
    fn finds_urls_and_generation_ids() {
        let direct = json!({"data": {"generated_images": [{"url": "https://x/1.png"}, {"id": 2}]}});
        assert_eq!(collect_image_urls(&direct), vec!["https://x/1.png"]);

        let pending = json!({"generate": {"generationId": "gen-1", "apiCreditCost": 3}});
        assert_eq!(find_generation_id(&pending).as_deref(), Some("gen-1"));

        let nested = json!({"sdGenerationJob": {"generation_id": "gen-2"}});
        assert_eq!(find_generation_id(&nested).as_deref(), Some("gen-2"));
        assert!(find_generation_id(&json!({"ok": true})).is_none());
    }

    #[test]
    fn error_details_prefer_specific_fields() {
        assert_eq!(error_details(&json!({"error": "bad key"})), "bad key");
        assert_eq!(
            error_details(&json!([{"message": "m", "extensions": {"details": "too big"}}])),
            "too big"
        );
    }

    #[tokio::test]
    async fn placeholder_written_without_api_key() {
        let tmp = TempDir::new().unwrap();
        let outputs = OutputConfig {
            root: tmp.path().to_path_buf(),
            ..OutputConfig::default()
        };
        let projects = Arc::new(ProjectPaths::open(tmp.path().join("paths.json")));
        let tool = GenerateImageTool::new(Arc::new(OutputLayout::new(outputs, projects)), config());

        let out = tool
            .execute(json!({"prompt": "a dragon", "width": 672, "height": 672}))
            .await
            .unwrap();
        let images = out["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        let filename = images[0]["filename"].as_str().unwrap();
        assert!(filename.starts_with("leonardo_stub_"));
        assert_eq!(images[0]["url"], format!("/images/{filename}"));

        let written = image::open(tmp.path().join("images").join(filename)).unwrap();
        assert_eq!((written.width(), written.height()), (672, 672));
    }
}
