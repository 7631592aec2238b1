//! Tools the model may call mid-conversation.
//!
//! Every tool writes only inside the output layout (documents or images
//! folder of the shared root or of a configured project), or reads skill
//! instructions from the skills folder.

pub mod export;
pub mod imaging;
pub mod output;
pub mod skills;

use std::sync::Arc;

use studiobot_config::ImageConfig;
use studiobot_core::tool::ToolRegistry;

pub use export::{ExportDocxTool, ExportPdfTool, ExportReceipt, ExportXlsxTool};
pub use imaging::{
    ConvertImageTool, CropImageTool, GenerateImageTool, ImageReceipt, ResizeImageTool,
};
pub use output::{OutputLayout, ResolvedPaths, download_url, image_url};
pub use skills::{LoadSkillTool, SkillInfo, SkillLibrary};

/// The full tool catalogue. This registry is also the allow-list: nothing
/// outside it can be dispatched.
pub fn default_registry(
    layout: Arc<OutputLayout>,
    images: &ImageConfig,
    skills: Arc<SkillLibrary>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ExportPdfTool::new(layout.clone())));
    registry.register(Arc::new(ExportDocxTool::new(layout.clone())));
    registry.register(Arc::new(GenerateImageTool::new(layout.clone(), images.clone())));
    registry.register(Arc::new(ResizeImageTool::new(layout.clone())));
    registry.register(Arc::new(CropImageTool::new(layout.clone())));
    registry.register(Arc::new(ConvertImageTool::new(layout.clone())));
    registry.register(Arc::new(ExportXlsxTool::new(layout)));
    registry.register(Arc::new(LoadSkillTool::new(skills)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use studiobot_config::OutputConfig;
    use studiobot_memory::ProjectPaths;

    fn registry() -> ToolRegistry {
        let tmp = tempfile::TempDir::new().unwrap();
        let projects = Arc::new(ProjectPaths::open(tmp.path().join("paths.json")));
        let layout = Arc::new(OutputLayout::new(OutputConfig::default(), projects));
        default_registry(
            layout,
            &ImageConfig::default(),
            Arc::new(SkillLibrary::new(tmp.path())),
        )
    }

    #[test]
    fn catalogue_is_complete() {
        let registry = registry();
        assert_eq!(
            registry.names(),
            vec![
                "export_pdf",
                "export_docx",
                "generate_image",
                "resize_image",
                "crop_image",
                "convert_image",
                "export_xlsx",
                "load_skill",
            ]
        );
        assert!(!registry.is_allowed("shell"));
    }

    #[test]
    fn event_names() {
        let registry = registry();
        let event = |name: &str| registry.get(name).unwrap().event_name().to_string();
        assert_eq!(event("export_pdf"), "pdf_saved");
        assert_eq!(event("export_docx"), "docx_saved");
        assert_eq!(event("export_xlsx"), "xlsx_saved");
        assert_eq!(event("generate_image"), "image_generated");
        assert_eq!(event("crop_image"), "image_updated");
        assert_eq!(event("load_skill"), "skill_loaded");
    }

    #[tokio::test]
    async fn image_failures_name_the_operation() {
        let registry = registry();
        let outcome = registry
            .dispatch("convert_image", r#"{"input_filename": "a.png", "format": "bmp"}"#)
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.event, "image_updated");
        assert_eq!(outcome.payload["operation"], "convert_image");
        assert_eq!(outcome.payload["error"], "Unsupported format.");

        let outcome = registry.dispatch("export_pdf", "{}").await;
        assert_eq!(outcome.event, "pdf_saved");
        assert_eq!(outcome.payload["error"], "Tool arg 'title' is required.");
    }
}
