//! Results page and file downloads.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
};

use super::super::template_structs::ResultsTemplate;
use super::super::AppState;
use super::helpers::{error_page, json_error, render};
use crate::models::SessionStatus;

pub async fn results_page(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(session) = state.sessions.get(&session_id) else {
        return Redirect::to("/").into_response();
    };

    match (&session.status, &session.result) {
        (SessionStatus::Completed, Some(result)) => {
            render(&ResultsTemplate::new(&session, result)).into_response()
        }
        (SessionStatus::Error, _) => error_page(
            StatusCode::OK,
            "Processing failed",
            session
                .error_detail
                .as_deref()
                .unwrap_or(session.message.as_str()),
        ),
        _ => Redirect::to(&format!("/processing/{}", session_id)).into_response(),
    }
}

/// Serve one export file of a completed session as an attachment.
pub async fn download_file(
    State(state): State<AppState>,
    Path((session_id, format)): Path<(String, String)>,
) -> Response {
    let Some(session) = state.sessions.get(&session_id) else {
        return json_error(StatusCode::NOT_FOUND, "Session not found");
    };

    let result = match (&session.status, &session.result) {
        (SessionStatus::Completed, Some(result)) => result,
        _ => return json_error(StatusCode::BAD_REQUEST, "Processing not completed"),
    };

    let Some(file) = result.download_info.find(&format) else {
        return json_error(StatusCode::NOT_FOUND, "File not found");
    };

    let content = match tokio::fs::read(&file.path).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(
                session_id = %session_id,
                "Export file {} unreadable: {}",
                file.path.display(),
                e
            );
            return json_error(StatusCode::NOT_FOUND, "File not found");
        }
    };

    let mime = mime_guess::from_path(&file.path)
        .first_or_octet_stream()
        .to_string();
    let disposition = format!(
        "attachment; filename=\"{}\"",
        file.filename.replace('"', "")
    );

    (
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response()
}
