//! Router configuration for the web server.

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let body_limit =
        usize::try_from(state.settings.max_upload_bytes + MULTIPART_OVERHEAD).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(handlers::index))
        .route(
            "/upload",
            get(handlers::upload_form).post(handlers::upload_file),
        )
        // Session lifecycle
        .route("/processing/:session_id", get(handlers::processing_page))
        .route("/api/status/:session_id", get(handlers::api_status))
        .route("/results/:session_id", get(handlers::results_page))
        .route(
            "/download/:session_id/:format",
            get(handlers::download_file),
        )
        // Static assets (CSS/JS)
        .route("/static/style.css", get(handlers::serve_css))
        .route("/static/poller.js", get(handlers::serve_js))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

