//! Status endpoint and processing page.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};

use super::super::template_structs::ProcessingTemplate;
use super::super::AppState;
use super::helpers::{json_error, render};

/// Current snapshot of a session. Never cached so polling sees fresh state.
pub async fn api_status(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.sessions.snapshot(&session_id) {
        Some(snapshot) => (
            [(header::CACHE_CONTROL, "no-store")],
            Json(snapshot),
        )
            .into_response(),
        None => {
            tracing::debug!(session_id = %session_id, "Status requested for unknown session");
            json_error(StatusCode::NOT_FOUND, "Session not found")
        }
    }
}

/// Progress page that hosts the browser poller.
pub async fn processing_page(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.sessions.get(&session_id) else {
        return Redirect::to("/").into_response();
    };
    render(&ProcessingTemplate::new(&session, &state.settings.poller)).into_response()
}
