//! HTTP gateway for studiobot.
//!
//! Serves the streaming chat endpoint plus the supporting routes a client
//! needs around it: history, knowledge, generated files, tool listing and
//! the project folder map. See [`api`] for the route list.

pub mod api;
pub mod error;
pub mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::response::Json;
use axum::routing::{get, post, put};
use axum::Router;
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub use error::ApiError;
pub use state::{AppState, SharedState};

/// Request body limit; matches the largest document a tool accepts plus slack.
const BODY_LIMIT: usize = 4 * 1024 * 1024;
/// PDF uploads for the knowledge base.
const UPLOAD_LIMIT: usize = 25 * 1024 * 1024;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Build the router with every route and layer.
pub fn build_router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config.gateway.cors_origins);
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat/stream", post(api::chat_stream))
        .route("/history/{agent}", get(api::get_history).delete(api::clear_history))
        .route("/knowledge/ingest", post(api::ingest))
        .route(
            "/knowledge/upload_pdf",
            post(api::upload_pdf).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/knowledge/retrieve", post(api::retrieve))
        .route("/knowledge/sources", get(api::sources))
        .route("/downloads/{filename}", get(api::download))
        .route("/images/{filename}", get(api::image))
        .route("/tools", get(api::tools))
        .route("/tools/paths", get(api::tool_paths))
        .route("/tools/{name}", post(api::invoke_tool))
        .route("/skills", get(api::skills))
        .route("/projects", get(api::list_projects))
        .route("/projects/{key}", put(api::set_project).delete(api::remove_project))
        .with_state(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway and serve until the process stops.
pub async fn start(config: studiobot_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = Arc::new(AppState::build(config));
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "ok": true }))
}
