//! `studiobot ingest`: add a text, markdown or PDF file to the persisted
//! knowledge base.

use std::path::Path;

use studiobot_gateway::AppState;
use studiobot_memory::{IngestRequest, PdfUpload};

pub async fn run(
    config_path: Option<&Path>,
    file: &Path,
    title: Option<String>,
    agents: Vec<String>,
    project: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".into());
    let is_pdf = file
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let state = AppState::build(config);
    let report = if is_pdf {
        let bytes = std::fs::read(file).map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
        state
            .knowledge
            .ingest_pdf(PdfUpload {
                filename,
                bytes,
                title,
                agent_ids: agents,
                project_key: project,
            })
            .await?
    } else {
        let text = std::fs::read_to_string(file)
            .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
        state
            .knowledge
            .ingest(IngestRequest {
                title: title.unwrap_or(filename),
                text,
                agent_ids: agents,
                project_key: project,
            })
            .await?
    };

    println!("Ingested '{}' as {} ({} chunks)", report.title, report.source_id, report.chunks);
    Ok(())
}
