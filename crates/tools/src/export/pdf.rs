//! PDF export tool.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use serde_json::Value;
use studiobot_core::error::ToolError;
use studiobot_core::tool::Tool;

use super::{DocumentArgs, choose_filename, prepare_target, write_blocking};
use crate::output::OutputLayout;

const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const MARGIN: f32 = 19.05;
const LINE_HEIGHT: f32 = 4.94;
const TITLE_SIZE: f32 = 16.0;
const BODY_SIZE: f32 = 10.0;
/// Helvetica 10pt fits roughly this many characters between the margins.
const LINE_CHARS: usize = 95;

pub struct ExportPdfTool {
    layout: Arc<OutputLayout>,
}

impl ExportPdfTool {
    pub fn new(layout: Arc<OutputLayout>) -> Self {
        Self { layout }
    }
}

/// Greedy word wrap by character count. Over-long words are split.
pub fn wrap_line(line: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in line.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..max_chars).collect());
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        let needed = current.chars().count() + 1 + word.chars().count();
        if !current.is_empty() && needed > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

fn write_pdf(path: &Path, title: &str, content: &str) -> Result<(), String> {
    let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| e.to_string())?;
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| e.to_string())?;

    let mut current = doc.get_page(page).get_layer(layer);
    let mut y = PAGE_HEIGHT - MARGIN;
    current.use_text(title, TITLE_SIZE, Mm(MARGIN), Mm(y), &bold);
    y -= LINE_HEIGHT * 2.0;

    let mut page_no = 1;
    for line in content.lines().flat_map(|l| wrap_line(l, LINE_CHARS)) {
        if y <= MARGIN {
            page_no += 1;
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Layer {page_no}"));
            current = doc.get_page(page).get_layer(layer);
            y = PAGE_HEIGHT - MARGIN;
        }
        if !line.is_empty() {
            current.use_text(line, BODY_SIZE, Mm(MARGIN), Mm(y), &regular);
        }
        y -= LINE_HEIGHT;
    }

    let file = File::create(path).map_err(|e| format!("Failed to create PDF: {e}"))?;
    doc.save(&mut BufWriter::new(file))
        .map_err(|e| format!("Failed to write PDF: {e}"))
}

#[async_trait]
impl Tool for ExportPdfTool {
    fn name(&self) -> &str {
        "export_pdf"
    }

    fn description(&self) -> &str {
        "Save a generated document to a PDF file on disk. Use only when the user explicitly asks to save or export to PDF."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Document title" },
                "content": { "type": "string", "description": "Document body as plain text" },
                "filename": { "type": "string", "description": "Optional file name, e.g. pitch.pdf" },
                "project_key": { "type": "string", "description": "Project whose folder receives the file" }
            },
            "required": ["title", "content"]
        })
    }

    fn event_name(&self) -> &str {
        "pdf_saved"
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args = DocumentArgs::from_value(&arguments)?;
        let filename = choose_filename(args.filename.as_deref(), &args.title, "pdf", "document");
        let key = args.project_key.as_deref();
        let path = prepare_target(&self.layout, self.name(), key, &filename).await?;

        let DocumentArgs { title, content, .. } = args;
        write_blocking(self.name(), path, key, move |p| write_pdf(p, &title, &content)).await
    }
}
