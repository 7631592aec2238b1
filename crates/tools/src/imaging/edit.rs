//! Resize, crop and convert images already in the images folder.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde_json::{Value, json};
use studiobot_core::error::ToolError;
use studiobot_core::tool::Tool;
use tracing::info;

use super::{
    EditTarget, ImageReceipt, failure_payload, int_arg, output_filename, output_path, snap_dimension,
};
use crate::export::optional_str;
use crate::output::OutputLayout;

const DEFAULT_JPEG_QUALITY: u8 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Fit inside the box, centred on a transparent canvas
    Contain,
    /// Fill the box and crop the overflow
    Cover,
    Stretch,
}

impl ResizeMode {
    /// Unknown modes fall back to `Contain`.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("cover") => Self::Cover,
            Some("stretch") => Self::Stretch,
            _ => Self::Contain,
        }
    }
}

pub fn resize(image: &DynamicImage, width: u32, height: u32, mode: ResizeMode) -> DynamicImage {
    match mode {
        ResizeMode::Stretch => image.resize_exact(width, height, FilterType::Lanczos3),
        ResizeMode::Cover => image.resize_to_fill(width, height, FilterType::Lanczos3),
        ResizeMode::Contain => {
            let fitted = image.resize(width, height, FilterType::Lanczos3).to_rgba8();
            let mut canvas = RgbaImage::new(width, height);
            let x = (width - fitted.width()) / 2;
            let y = (height - fitted.height()) / 2;
            imageops::overlay(&mut canvas, &fitted, i64::from(x), i64::from(y));
            DynamicImage::ImageRgba8(canvas)
        }
    }
}

/// Crop rectangle clipped to the image. `None` when nothing is left.
pub fn crop_area(image_w: u32, image_h: u32, x: i64, y: i64, w: i64, h: i64) -> Option<(u32, u32, u32, u32)> {
    let x = x.max(0);
    let y = y.max(0);
    let right = (x + w.max(1)).min(i64::from(image_w));
    let lower = (y + h.max(1)).min(i64::from(image_h));
    if right <= x || lower <= y {
        return None;
    }
    Some((x as u32, y as u32, (right - x) as u32, (lower - y) as u32))
}

/// Target format for `convert_image`: `(encoder format, file extension)`.
pub fn parse_format(value: &str) -> Option<(ImageFormat, &'static str)> {
    match value.trim().to_ascii_lowercase().as_str() {
        "png" => Some((ImageFormat::Png, "png")),
        "jpg" | "jpeg" => Some((ImageFormat::Jpeg, "jpg")),
        "webp" => Some((ImageFormat::WebP, "webp")),
        _ => None,
    }
}

fn save(image: &DynamicImage, path: &Path, format: ImageFormat, quality: u8) -> Result<(), String> {
    match format {
        ImageFormat::Jpeg => {
            let file = File::create(path).map_err(|e| e.to_string())?;
            let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), quality);
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|e| e.to_string())
        }
        // The WebP encoder only takes 8-bit RGB(A) and is lossless.
        ImageFormat::WebP => DynamicImage::ImageRgba8(image.to_rgba8())
            .save_with_format(path, format)
            .map_err(|e| e.to_string()),
        _ => image.save_with_format(path, format).map_err(|e| e.to_string()),
    }
}

/// Open the input, transform it and save it as `output`, off the async runtime.
async fn transform<F>(tool_name: &str, input: PathBuf, output: PathBuf, format: ImageFormat, quality: u8, op: F) -> Result<(), ToolError>
where
    F: FnOnce(DynamicImage) -> Result<DynamicImage, String> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let image = image::open(&input).map_err(|e| format!("Failed to read image: {e}"))?;
        let result = op(image)?;
        save(&result, &output, format, quality)
    })
    .await
    .map_err(|e| ToolError::failed(tool_name, e.to_string()))?
    .map_err(|reason| ToolError::failed(tool_name, reason))
}

async fn finish(
    tool_name: &str,
    target: EditTarget,
    prefix: &str,
    extension: &str,
    format: ImageFormat,
    quality: u8,
    op: impl FnOnce(DynamicImage) -> Result<DynamicImage, String> + Send + 'static,
) -> Result<Value, ToolError> {
    let name = output_filename(target.output_name.as_deref(), prefix, extension);
    let path = output_path(&target.dir, tool_name, &name)?;
    transform(tool_name, target.input, path.clone(), format, quality, op).await?;
    info!(tool = tool_name, path = %path.display(), "Image written");
    serde_json::to_value(ImageReceipt::new(&path, target.project_key.as_deref()))
        .map_err(|e| ToolError::failed(tool_name, e.to_string()))
}

fn edit_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = json!({
        "input_filename": { "type": "string", "description": "Existing image in the images folder" },
        "output_filename": { "type": "string", "description": "Optional name for the result" },
        "project_key": { "type": "string", "description": "Project whose images folder is used" }
    });
    if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        props.extend(extra.clone());
    }
    let mut required_fields = vec!["input_filename"];
    required_fields.extend_from_slice(required);
    json!({ "type": "object", "properties": properties, "required": required_fields })
}

pub struct ResizeImageTool {
    layout: Arc<OutputLayout>,
}

impl ResizeImageTool {
    pub fn new(layout: Arc<OutputLayout>) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Tool for ResizeImageTool {
    fn name(&self) -> &str {
        "resize_image"
    }

    fn description(&self) -> &str {
        "Resize an existing image by filename."
    }

    fn parameters_schema(&self) -> Value {
        edit_schema(
            json!({
                "width": { "type": "integer" },
                "height": { "type": "integer" },
                "mode": { "type": "string", "enum": ["contain", "cover", "stretch"] }
            }),
            &["width", "height"],
        )
    }

    fn event_name(&self) -> &str {
        "image_updated"
    }

    fn failure_payload(&self, message: &str) -> Value {
        failure_payload(self.name(), message)
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let target = EditTarget::from_args(&self.layout, self.name(), &arguments).await?;
        let width = snap_dimension(u32::try_from(int_arg(&arguments, "width", 1024)).unwrap_or(0));
        let height = snap_dimension(u32::try_from(int_arg(&arguments, "height", 1024)).unwrap_or(0));
        let mode = ResizeMode::parse(optional_str(&arguments, "mode").as_deref());

        finish(self.name(), target, "resize", "png", ImageFormat::Png, DEFAULT_JPEG_QUALITY, move |img| {
            Ok(resize(&img, width, height, mode))
        })
        .await
    }
}

pub struct CropImageTool {
    layout: Arc<OutputLayout>,
}

impl CropImageTool {
    pub fn new(layout: Arc<OutputLayout>) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Tool for CropImageTool {
    fn name(&self) -> &str {
        "crop_image"
    }

    fn description(&self) -> &str {
        "Crop an existing image by filename and rectangle."
    }

    fn parameters_schema(&self) -> Value {
        edit_schema(
            json!({
                "x": { "type": "integer" },
                "y": { "type": "integer" },
                "width": { "type": "integer" },
                "height": { "type": "integer" }
            }),
            &["x", "y", "width", "height"],
        )
    }

    fn event_name(&self) -> &str {
        "image_updated"
    }

    fn failure_payload(&self, message: &str) -> Value {
        failure_payload(self.name(), message)
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let target = EditTarget::from_args(&self.layout, self.name(), &arguments).await?;
        let x = int_arg(&arguments, "x", 0);
        let y = int_arg(&arguments, "y", 0);
        let w = int_arg(&arguments, "width", 1);
        let h = int_arg(&arguments, "height", 1);

        finish(self.name(), target, "crop", "png", ImageFormat::Png, DEFAULT_JPEG_QUALITY, move |img| {
            let (x, y, w, h) =
                crop_area(img.width(), img.height(), x, y, w, h).ok_or("Invalid crop area.")?;
            Ok(img.crop_imm(x, y, w, h))
        })
        .await
    }
}

pub struct ConvertImageTool {
    layout: Arc<OutputLayout>,
}

impl ConvertImageTool {
    pub fn new(layout: Arc<OutputLayout>) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl Tool for ConvertImageTool {
    fn name(&self) -> &str {
        "convert_image"
    }

    fn description(&self) -> &str {
        "Convert an image to another format."
    }

    fn parameters_schema(&self) -> Value {
        edit_schema(
            json!({
                "format": { "type": "string", "enum": ["png", "jpg", "webp"] },
                "quality": { "type": "integer", "minimum": 1, "maximum": 95 }
            }),
            &["format"],
        )
    }

    fn event_name(&self) -> &str {
        "image_updated"
    }

    fn failure_payload(&self, message: &str) -> Value {
        failure_payload(self.name(), message)
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let (format, extension) = optional_str(&arguments, "format")
            .as_deref()
            .and_then(parse_format)
            .ok_or_else(|| ToolError::InvalidArguments("Unsupported format.".into()))?;
        let target = EditTarget::from_args(&self.layout, self.name(), &arguments).await?;
        let quality = int_arg(&arguments, "quality", i64::from(DEFAULT_JPEG_QUALITY)).clamp(1, 95) as u8;

        finish(self.name(), target, "convert", extension, format, quality, Ok).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use studiobot_config::OutputConfig;
    use studiobot_memory::ProjectPaths;
    use tempfile::TempDir;

    fn layout(tmp: &TempDir) -> Arc<OutputLayout> {
        let outputs = OutputConfig {
            root: tmp.path().to_path_buf(),
            ..OutputConfig::default()
        };
        let projects = Arc::new(ProjectPaths::open(tmp.path().join("paths.json")));
        Arc::new(OutputLayout::new(outputs, projects))
    }

    fn seed_image(tmp: &TempDir, name: &str, w: u32, h: u32) {
        let dir = tmp.path().join("images");
        std::fs::create_dir_all(&dir).unwrap();
        RgbaImage::from_pixel(w, h, Rgba([200, 10, 10, 255]))
            .save_with_format(dir.join(name), ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn resize_modes_parse() {
        assert_eq!(ResizeMode::parse(Some("COVER")), ResizeMode::Cover);
        assert_eq!(ResizeMode::parse(Some("stretch")), ResizeMode::Stretch);
        assert_eq!(ResizeMode::parse(Some("zoom")), ResizeMode::Contain);
        assert_eq!(ResizeMode::parse(None), ResizeMode::Contain);
    }

    #[test]
    fn contain_letterboxes_on_transparent_canvas() {
        let wide = DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 100, Rgba([1, 2, 3, 255])));
        let out = resize(&wide, 100, 100, ResizeMode::Contain).to_rgba8();
        assert_eq!(out.dimensions(), (100, 100));
        assert_eq!(out.get_pixel(50, 0)[3], 0);
        assert_eq!(out.get_pixel(50, 50)[3], 255);
    }

    #[test]
    fn crop_area_clips_to_image() {
        assert_eq!(crop_area(100, 50, -5, 10, 30, 100), Some((0, 10, 30, 40)));
        assert_eq!(crop_area(100, 50, 10, 10, 0, 0), Some((10, 10, 1, 1)));
        assert_eq!(crop_area(100, 50, 100, 0, 10, 10), None);
    }

    #[test]
    fn formats_parse() {
        assert_eq!(parse_format("JPEG"), Some((ImageFormat::Jpeg, "jpg")));
        assert_eq!(parse_format("webp"), Some((ImageFormat::WebP, "webp")));
        assert!(parse_format("gif").is_none());
    }

    #[tokio::test]
    async fn crop_writes_png() {
        let tmp = TempDir::new().unwrap();
        seed_image(&tmp, "hero.png", 64, 48);
        let tool = CropImageTool::new(layout(&tmp));
        let out = tool
            .execute(json!({
                "input_filename": "hero.png", "x": 10, "y": 8, "width": 20, "height": 100,
                "output_filename": "hero_crop"
            }))
            .await
            .unwrap();
        assert_eq!(out["filename"], "hero_crop.png");
        let cropped = image::open(tmp.path().join("images").join("hero_crop.png")).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (20, 40));
    }

    #[tokio::test]
    async fn crop_outside_image_fails() {
        let tmp = TempDir::new().unwrap();
        seed_image(&tmp, "hero.png", 16, 16);
        let err = CropImageTool::new(layout(&tmp))
            .execute(json!({"input_filename": "hero.png", "x": 40, "y": 0, "width": 5, "height": 5}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid crop area.");
    }

    #[tokio::test]
    async fn convert_to_jpeg() {
        let tmp = TempDir::new().unwrap();
        seed_image(&tmp, "hero.png", 32, 32);
        let out = ConvertImageTool::new(layout(&tmp))
            .execute(json!({"input_filename": "hero.png", "format": "jpeg", "quality": 300}))
            .await
            .unwrap();
        let filename = out["filename"].as_str().unwrap();
        assert!(filename.starts_with("convert_") && filename.ends_with(".jpg"));
        let bytes = std::fs::read(tmp.path().join("images").join(filename)).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[tokio::test]
    async fn resize_snaps_dimensions() {
        let tmp = TempDir::new().unwrap();
        seed_image(&tmp, "wide.png", 300, 100);
        let out = ResizeImageTool::new(layout(&tmp))
            .execute(json!({"input_filename": "wide.png", "width": 700, "height": 700, "mode": "stretch"}))
            .await
            .unwrap();
        let resized = image::open(out["path"].as_str().unwrap()).unwrap();
        assert_eq!((resized.width(), resized.height()), (672, 672));
    }

    #[tokio::test]
    async fn unsupported_convert_format() {
        let tmp = TempDir::new().unwrap();
        let err = ConvertImageTool::new(layout(&tmp))
            .execute(json!({"input_filename": "hero.png", "format": "gif"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unsupported format.");
    }
}
