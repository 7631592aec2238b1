//! DOCX export tool. Content is read as light markdown.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use docx_rs::{Docx, Paragraph, Run};
use serde_json::Value;
use studiobot_core::error::ToolError;
use studiobot_core::tool::Tool;

use super::{DocumentArgs, choose_filename, prepare_target, write_blocking};
use crate::output::OutputLayout;

pub struct ExportDocxTool {
    layout: Arc<OutputLayout>,
}

impl ExportDocxTool {
    pub fn new(layout: Arc<OutputLayout>) -> Self {
        Self { layout }
    }
}

/// One rendered line of the document body.
#[derive(Debug, PartialEq, Eq)]
pub enum Block<'a> {
    Blank,
    Heading(u8, &'a str),
    Bullet(&'a str),
    Numbered(&'a str, &'a str),
    Text(&'a str),
}

pub fn classify(line: &str) -> Block<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Block::Blank;
    }
    for (prefix, level) in [("### ", 3), ("## ", 2), ("# ", 1)] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Block::Heading(level, rest.trim());
        }
    }
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Block::Bullet(rest.trim());
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0
        && let Some(rest) = line[digits..].strip_prefix('.')
        && rest.starts_with(char::is_whitespace)
    {
        return Block::Numbered(&line[..digits], rest.trim());
    }
    Block::Text(line)
}

/// Half-point font size for a heading level.
fn heading_size(level: u8) -> usize {
    match level {
        1 => 32,
        2 => 28,
        _ => 24,
    }
}

fn heading(text: &str, level: u8) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text).bold().size(heading_size(level)))
}

fn render(title: &str, content: &str) -> Docx {
    let mut docx = Docx::new().add_paragraph(heading(title, 1));
    for line in content.lines() {
        let paragraph = match classify(line) {
            Block::Blank => Paragraph::new(),
            Block::Heading(level, text) => heading(text, level),
            Block::Bullet(text) => Paragraph::new().add_run(Run::new().add_text(format!("\u{2022} {text}"))),
            Block::Numbered(n, text) => Paragraph::new().add_run(Run::new().add_text(format!("{n}. {text}"))),
            Block::Text(text) => Paragraph::new().add_run(Run::new().add_text(text)),
        };
        docx = docx.add_paragraph(paragraph);
    }
    docx
}

fn write_docx(path: &Path, title: &str, content: &str) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("Failed to create DOCX: {e}"))?;
    render(title, content)
        .build()
        .pack(file)
        .map_err(|e| format!("Failed to write DOCX: {e}"))
}

#[async_trait]
impl Tool for ExportDocxTool {
    fn name(&self) -> &str {
        "export_docx"
    }

    fn description(&self) -> &str {
        "Save a generated document to a Word (.docx) file on disk. Use only when the user explicitly asks to save or export to Word or DOCX."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Document title" },
                "content": {
                    "type": "string",
                    "description": "Document body. Lines starting with #, ## or ### become headings; - or * become bullets"
                },
                "filename": { "type": "string", "description": "Optional file name, e.g. design.docx" },
                "project_key": { "type": "string", "description": "Project whose folder receives the file" }
            },
            "required": ["title", "content"]
        })
    }

    fn event_name(&self) -> &str {
        "docx_saved"
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = DocumentArgs::from_value(&arguments)?;
        let filename = choose_filename(args.filename.as_deref(), &args.title, "docx", "document");
        let key = args.project_key.as_deref();
        let path = prepare_target(&self.layout, self.name(), key, &filename).await?;

        let DocumentArgs { title, content, .. } = args;
        write_blocking(self.name(), path, key, move |p| write_docx(p, &title, &content)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use studiobot_config::OutputConfig;
    use studiobot_memory::ProjectPaths;
    use tempfile::TempDir;

    #[test]
    fn classifies_markdown_lines() {
        assert_eq!(classify("   "), Block::Blank);
        assert_eq!(classify("## Enemies"), Block::Heading(2, "Enemies"));
        assert_eq!(classify("### Boss"), Block::Heading(3, "Boss"));
        assert_eq!(classify("* sword"), Block::Bullet("sword"));
        assert_eq!(classify("12. jump"), Block::Numbered("12", "jump"));
        assert_eq!(classify("3.5 stars"), Block::Text("3.5 stars"));
        assert_eq!(classify("#hashtag"), Block::Text("#hashtag"));
    }

    #[tokio::test]
    async fn writes_docx_under_project_folder() {
        let tmp = TempDir::new().unwrap();
        let projects = Arc::new(ProjectPaths::open(tmp.path().join("paths.json")));
        let game = tmp.path().join("game");
        projects.set("demo", game.to_str().unwrap()).await.unwrap();
        let layout = Arc::new(OutputLayout::new(OutputConfig::default(), projects));
        let tool = ExportDocxTool::new(layout);

        let out = tool
            .execute(json!({
                "title": "Design Doc",
                "content": "# Intro\n- point one\n1. first\nplain",
                "project_key": "demo"
            }))
            .await
            .unwrap();

        let filename = out["filename"].as_str().unwrap();
        assert!(filename.starts_with("design_doc_") && filename.ends_with(".docx"));
        assert_eq!(
            out["download_url"],
            format!("/downloads/{filename}?project_key=demo")
        );
        let bytes = std::fs::read(game.join("gen").join(filename)).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }
}
