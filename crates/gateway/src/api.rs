//! Route handlers.
//!
//! - `POST   /chat/stream`  one chat turn as a server-sent-event stream
//! - `GET    /history/{agent}`  stored turns for an agent
//! - `DELETE /history/{agent}`  forget an agent's turns
//! - `POST   /knowledge/ingest`  chunk, embed and store a document
//! - `POST   /knowledge/upload_pdf`  multipart PDF upload, ingested like text
//! - `POST   /knowledge/retrieve`  similarity search
//! - `GET    /knowledge/sources`  ingested sources, newest first
//! - `GET    /downloads/{filename}`  generated documents
//! - `GET    /images/{filename}`  generated or edited images
//! - `GET    /tools`  tool definitions offered to the model
//! - `GET    /tools/paths`  output folders for a project
//! - `POST   /tools/{name}`  run one tool directly, outside a chat turn
//! - `GET    /skills`  discovered skills
//! - `GET    /projects`, `PUT|DELETE /projects/{key}`  project folder map

use std::convert::Infallible;
use std::path::PathBuf;

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use studiobot_agent::ChatTurn;
use studiobot_core::knowledge::{RetrievalQuery, RetrievedChunk, Retriever, Scope};
use studiobot_memory::{IngestReport, IngestRequest, PdfUpload};
use studiobot_security::{IMAGE_EXTENSIONS, resolve_within, validate_input_filename};
use studiobot_tools::ResolvedPaths;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::SharedState;

const DOCUMENT_EXTENSIONS: &[&str] = &["pdf", "docx", "xlsx"];
const MAX_TOP_K: usize = 20;

#[derive(Debug, Default, Deserialize)]
pub struct ProjectQuery {
    #[serde(default)]
    pub project_key: Option<String>,
}

// ── Chat ──────────────────────────────────────────────────────────────────

pub async fn chat_stream(State(state): State<SharedState>, Json(turn): Json<ChatTurn>) -> Response {
    info!(
        agent = turn.agent.as_deref().unwrap_or("-"),
        project = turn.project_key.as_deref().unwrap_or("-"),
        "chat/stream request"
    );
    let events = state.orchestrator.run_stream(turn);
    let frames = ReceiverStream::new(events).map(|event| Ok::<_, Infallible>(event.to_sse()));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

// ── History ───────────────────────────────────────────────────────────────

pub async fn get_history(State(state): State<SharedState>, Path(agent): Path<String>) -> Json<Value> {
    let agent_id = state.orchestrator.normalize_agent(Some(&agent));
    let messages = state.orchestrator.history().read(&agent_id).await;
    Json(json!({ "agent": agent_id, "messages": messages }))
}

pub async fn clear_history(State(state): State<SharedState>, Path(agent): Path<String>) -> Json<Value> {
    let agent_id = state.orchestrator.normalize_agent(Some(&agent));
    state.orchestrator.history().clear(&agent_id).await;
    Json(json!({ "ok": true, "agent": agent_id }))
}

// ── Knowledge ─────────────────────────────────────────────────────────────

fn ingest_response(report: IngestReport) -> Json<Value> {
    Json(json!({ "ok": true, "source_id": report.source_id, "title": report.title, "chunks": report.chunks }))
}

pub async fn ingest(
    State(state): State<SharedState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<Value>, ApiError> {
    let report = state.knowledge.ingest(request).await?;
    Ok(ingest_response(report))
}

fn multipart_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::bad_request(format!("Multipart error: {e}"))
}

/// Fields: `file` (required), `title`, `agent_ids` (repeatable), `project_key`.
pub async fn upload_pdf(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut upload = PdfUpload::default();
    let mut has_file = false;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or_default() {
            "file" => {
                if let Some(content_type) = field.content_type()
                    && !content_type.is_empty()
                    && content_type != "application/pdf"
                {
                    return Err(ApiError::bad_request("Invalid content type."));
                }
                upload.filename = field.file_name().unwrap_or_default().to_string();
                upload.bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
                has_file = true;
            }
            "title" => upload.title = Some(field.text().await.map_err(multipart_error)?),
            "agent_ids" => upload.agent_ids.push(field.text().await.map_err(multipart_error)?),
            "project_key" => upload.project_key = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }
    if !has_file {
        return Err(ApiError::bad_request("No file provided."));
    }

    info!(file = %upload.filename, bytes = upload.bytes.len(), "knowledge/upload_pdf request");
    let report = state.knowledge.ingest_pdf(upload).await?;
    Ok(ingest_response(report))
}

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub project_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub chunks: Vec<RetrievedChunk>,
}

pub async fn retrieve(
    State(state): State<SharedState>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, ApiError> {
    let query = RetrievalQuery {
        query: request.query,
        top_k: request
            .top_k
            .unwrap_or(state.config.knowledge.top_k)
            .clamp(1, MAX_TOP_K),
        source_id: request.source_id,
        agent_ids: request.agent_ids,
        scope: request.scope,
        project_key: request.project_key,
    };
    let chunks = state.knowledge.retrieve(&query).await?;
    Ok(Json(RetrieveResponse { chunks }))
}

pub async fn sources(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "sources": state.knowledge.sources().await }))
}

// ── Generated files ───────────────────────────────────────────────────────

fn content_type(filename: &str) -> &'static str {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

async fn serve_file(
    dir: PathBuf,
    filename: &str,
    allowed: &[&str],
    disposition: &str,
) -> Result<Response, ApiError> {
    validate_input_filename(filename, allowed)?;
    let path = resolve_within(&dir, filename.trim())?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("File not found."));
        }
        Err(e) => return Err(ApiError::internal(format!("Failed to read file: {e}"))),
    };
    Ok((
        [
            (header::CONTENT_TYPE, content_type(filename).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("{disposition}; filename=\"{}\"", filename.trim()),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn download(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
    Query(query): Query<ProjectQuery>,
) -> Result<Response, ApiError> {
    let dir = state.layout.documents_dir(query.project_key.as_deref()).await?;
    serve_file(dir, &filename, DOCUMENT_EXTENSIONS, "attachment").await
}

pub async fn image(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
    Query(query): Query<ProjectQuery>,
) -> Result<Response, ApiError> {
    let dir = state.layout.images_dir(query.project_key.as_deref()).await?;
    serve_file(dir, &filename, IMAGE_EXTENSIONS, "inline").await
}

// ── Tools, skills and projects ────────────────────────────────────────────

pub async fn tools(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "tools": state.orchestrator.tools().definitions() }))
}

pub async fn tool_paths(
    State(state): State<SharedState>,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<ResolvedPaths>, ApiError> {
    let resolved = state.layout.resolve(query.project_key.as_deref()).await?;
    Ok(Json(resolved))
}

/// Run a registered tool with the JSON body as its arguments.
///
/// Answers with the tool's payload: 200 on success, 400 with the failure
/// payload otherwise.
pub async fn invoke_tool(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(arguments): Json<Value>,
) -> Result<Response, ApiError> {
    let registry = state.orchestrator.tools();
    if !registry.is_allowed(&name) {
        return Err(ApiError::bad_request(format!("Tool '{name}' is not allowed.")));
    }
    info!(tool = %name, "Direct tool invocation");
    let outcome = registry.dispatch(&name, &arguments.to_string()).await;
    if outcome.success {
        Ok(Json(outcome.payload).into_response())
    } else {
        warn!(tool = %name, "Direct tool invocation failed");
        Ok((StatusCode::BAD_REQUEST, Json(outcome.payload)).into_response())
    }
}

pub async fn skills(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "skills": state.skills.discover() }))
}

pub async fn list_projects(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({ "projects": state.layout.projects().list().await }))
}

#[derive(Debug, Deserialize)]
pub struct SetProjectRequest {
    pub path: String,
}

pub async fn set_project(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Json(request): Json<SetProjectRequest>,
) -> Result<Json<Value>, ApiError> {
    state.layout.projects().set(&key, &request.path).await?;
    Ok(Json(json!({ "ok": true, "project_key": key.trim(), "path": request.path.trim() })))
}

pub async fn remove_project(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.layout.projects().remove(&key).await? {
        Ok(Json(json!({ "ok": true, "project_key": key.trim() })))
    } else {
        Err(ApiError::not_found(format!("Project '{}' not found.", key.trim())))
    }
}
