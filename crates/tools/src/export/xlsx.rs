//! XLSX export tool.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rust_xlsxwriter::Workbook;
use serde_json::Value;
use studiobot_core::error::ToolError;
use studiobot_core::tool::Tool;

use super::{choose_filename, optional_str, prepare_target, required_str, write_blocking};
use crate::output::OutputLayout;

const MAX_SHEET_NAME: usize = 31;
const MAX_ROWS: usize = 1_048_576;
const MAX_COLS: usize = 16_384;

pub struct ExportXlsxTool {
    layout: Arc<OutputLayout>,
}

impl ExportXlsxTool {
    pub fn new(layout: Arc<OutputLayout>) -> Self {
        Self { layout }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Bool(bool),
    Text(String),
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Empty,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(Cell::Empty, Cell::Number),
            Value::String(s) => Cell::Text(s.trim().to_string()),
            other => Cell::Text(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SheetSpec {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

/// Excel rejects `[]:*?/\`, leading or trailing apostrophes and names over 31 chars.
pub fn sanitize_sheet_name(raw: &str) -> String {
    let replaced: String = raw
        .trim()
        .chars()
        .map(|c| if matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\') { '_' } else { c })
        .collect();
    let trimmed: String = replaced.trim_matches('\'').chars().take(MAX_SHEET_NAME).collect();
    match trimmed.trim() {
        "" => "Sheet".to_string(),
        name => name.to_string(),
    }
}

/// Sheet names must be unique ignoring case.
fn dedupe(name: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.clone();
    let mut n = 2;
    while !taken.insert(candidate.to_lowercase()) {
        let suffix = format!(" ({n})");
        let stem: String = name.chars().take(MAX_SHEET_NAME - suffix.len()).collect();
        candidate = format!("{stem}{suffix}");
        n += 1;
    }
    candidate
}

pub fn parse_sheets(arguments: &Value) -> Result<Vec<SheetSpec>, ToolError> {
    let raw = match arguments.get("sheets") {
        None | Some(Value::Null) => {
            return Err(ToolError::InvalidArguments("Tool arg 'sheets' is required.".into()));
        }
        Some(Value::Array(items)) if items.is_empty() => {
            return Err(ToolError::InvalidArguments("Tool arg 'sheets' is required.".into()));
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ToolError::InvalidArguments(
                "Tool arg 'sheets' must be a list of { name, rows }.".into(),
            ));
        }
    };

    let mut taken = HashSet::new();
    let sheets: Vec<SheetSpec> = raw
        .iter()
        .filter_map(Value::as_object)
        .map(|sheet| {
            let name = sanitize_sheet_name(sheet.get("name").and_then(Value::as_str).unwrap_or(""));
            let rows = sheet
                .get("rows")
                .and_then(Value::as_array)
                .map(|rows| {
                    rows.iter()
                        .filter_map(Value::as_array)
                        .take(MAX_ROWS)
                        .map(|row| row.iter().take(MAX_COLS).map(Cell::from).collect())
                        .collect()
                })
                .unwrap_or_default();
            SheetSpec {
                name: dedupe(name, &mut taken),
                rows,
            }
        })
        .collect();

    if sheets.is_empty() {
        return Err(ToolError::InvalidArguments(
            "At least one sheet with rows is required.".into(),
        ));
    }
    Ok(sheets)
}

fn write_xlsx(path: &Path, sheets: &[SheetSpec]) -> Result<(), String> {
    let mut workbook = Workbook::new();
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name).map_err(|e| e.to_string())?;
        for (r, row) in sheet.rows.iter().enumerate() {
            let r = u32::try_from(r).map_err(|e| e.to_string())?;
            for (c, cell) in row.iter().enumerate() {
                let c = u16::try_from(c).map_err(|e| e.to_string())?;
                match cell {
                    Cell::Empty => continue,
                    Cell::Number(n) => worksheet.write_number(r, c, *n),
                    Cell::Bool(b) => worksheet.write_boolean(r, c, *b),
                    Cell::Text(s) => worksheet.write_string(r, c, s),
                }
                .map_err(|e| e.to_string())?;
            }
        }
    }
    workbook
        .save(path)
        .map_err(|e| format!("Failed to write XLSX: {e}"))
}

#[async_trait]
impl Tool for ExportXlsxTool {
    fn name(&self) -> &str {
        "export_xlsx"
    }

    fn description(&self) -> &str {
        "Save a spreadsheet workbook to an .xlsx file in the current project's gen folder. Use when the user asks to create, save, or export a spreadsheet (xlsx, Excel). Provide sheets as a list of { name: string, rows: string[][] }."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Workbook title, used for the file name" },
                "sheets": {
                    "type": "array",
                    "description": "Sheets to write",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "rows": {
                                "type": "array",
                                "items": { "type": "array", "items": { "type": ["string", "number", "boolean", "null"] } }
                            }
                        },
                        "required": ["name", "rows"]
                    }
                },
                "filename": { "type": "string", "description": "Optional file name, e.g. budget.xlsx" },
                "project_key": { "type": "string", "description": "Project whose folder receives the file" }
            },
            "required": ["title", "sheets"]
        })
    }

    fn event_name(&self) -> &str {
        "xlsx_saved"
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let title = required_str(&arguments, "title")?;
        let sheets = parse_sheets(&arguments)?;
        let explicit = optional_str(&arguments, "filename");
        let project_key = optional_str(&arguments, "project_key");
        let key = project_key.as_deref();

        let filename = choose_filename(explicit.as_deref(), &title, "xlsx", "workbook");
        let path = prepare_target(&self.layout, self.name(), key, &filename).await?;
        write_blocking(self.name(), path, key, move |p| write_xlsx(p, &sheets)).await
    }
}
