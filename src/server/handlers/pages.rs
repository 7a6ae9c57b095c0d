//! Landing and upload form pages.

use axum::{extract::State, response::IntoResponse};

use super::super::template_structs::{ExportChoice, IndexTemplate, UploadTemplate};
use super::super::AppState;
use super::helpers::render;
use crate::config::CHUNK_SIZE_RANGE;
use crate::models::ProcessingOptions;

pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    render(&IndexTemplate {
        title: "Home",
        active_sessions: state.sessions.len(),
        retention_hours: state.settings.retention_hours,
    })
}

/// Upload form, optionally re-rendered with validation errors.
pub fn upload_page<'a>(
    state: &AppState,
    options: &'a ProcessingOptions,
    errors: Vec<String>,
) -> UploadTemplate<'a> {
    UploadTemplate {
        title: "Upload CSV",
        errors,
        text_column: &options.text_column,
        chunk_size: options.chunk_size,
        chunk_min: *CHUNK_SIZE_RANGE.start(),
        chunk_max: *CHUNK_SIZE_RANGE.end(),
        export_choices: ExportChoice::all(options.export),
        enable_cleaning: options.enable_cleaning,
        max_upload_mb: state.settings.max_upload_bytes / (1024 * 1024),
    }
}

pub async fn upload_form(State(state): State<AppState>) -> impl IntoResponse {
    let options = ProcessingOptions {
        chunk_size: state.settings.default_chunk_size,
        ..Default::default()
    };
    render(&upload_page(&state, &options, Vec::new()))
}
