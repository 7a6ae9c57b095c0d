//! Multipart upload handling.

use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use thiserror::Error;

use super::super::AppState;
use super::helpers::{json_error, render};
use super::pages::upload_page;
use crate::config::CHUNK_SIZE_RANGE;
use crate::models::{ExportSelection, ProcessingOptions};
use crate::processing::{spawn_session, ProcessingJob};
use crate::utils::secure_filename;

/// Reasons an upload is rejected before any session exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Invalid upload: {0}")]
    Multipart(String),

    #[error("Please select a CSV file")]
    MissingFile,

    #[error("Only CSV files are allowed")]
    NotCsv,

    #[error("File exceeds the {max_mb} MB limit")]
    TooLarge { max_mb: u64 },

    #[error("The uploaded file is empty")]
    EmptyFile,

    #[error("Chunk size must be between {min} and {max}")]
    ChunkSize { min: usize, max: usize },

    #[error("Text column name is required")]
    EmptyColumn,

    #[error("Unknown export format: {0}")]
    UnknownExport(String),
}

/// Raw form fields as received.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub filename: Option<String>,
    pub data: Vec<u8>,
    pub text_column: Option<String>,
    pub chunk_size: Option<String>,
    pub export_format: Option<String>,
    pub enable_cleaning: Option<String>,
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes" | "y"
    )
}

impl UploadForm {
    /// Read all fields. Unknown fields are ignored.
    pub async fn read(multipart: &mut Multipart, max_bytes: u64) -> Result<Self, UploadError> {
        let too_large = |e: MultipartError| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                UploadError::TooLarge {
                    max_mb: max_bytes / (1024 * 1024),
                }
            } else {
                UploadError::Multipart(e.body_text())
            }
        };

        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(too_large)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    form.filename = field.file_name().map(|s| s.to_string());
                    form.data = field.bytes().await.map_err(too_large)?.to_vec();
                }
                "text_column" | "chunk_size" | "export_format" | "enable_cleaning" => {
                    let value = field.text().await.map_err(too_large)?;
                    let slot = match name.as_str() {
                        "text_column" => &mut form.text_column,
                        "chunk_size" => &mut form.chunk_size,
                        "export_format" => &mut form.export_format,
                        _ => &mut form.enable_cleaning,
                    };
                    *slot = Some(value);
                }
                _ => {}
            }
        }
        Ok(form)
    }

    /// Options as submitted, with defaults for blank fields. Used both for
    /// processing and for re-rendering the form after a rejection.
    pub fn options(&self, default_chunk_size: usize) -> ProcessingOptions {
        let defaults = ProcessingOptions::default();
        ProcessingOptions {
            text_column: self
                .text_column
                .as_deref()
                .map(str::trim)
                .unwrap_or(&defaults.text_column)
                .to_string(),
            chunk_size: self
                .chunk_size
                .as_deref()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default_chunk_size),
            export: self
                .export_format
                .as_deref()
                .and_then(ExportSelection::from_str)
                .unwrap_or_default(),
            enable_cleaning: self.enable_cleaning.as_deref().is_some_and(is_truthy),
        }
    }

    /// Check every constraint, collecting all failures.
    pub fn validate(&self, max_bytes: u64) -> Result<(), Vec<UploadError>> {
        let mut errors = Vec::new();

        match self.filename.as_deref().filter(|f| !f.trim().is_empty()) {
            None => errors.push(UploadError::MissingFile),
            Some(name) => {
                if !name.to_ascii_lowercase().ends_with(".csv") {
                    errors.push(UploadError::NotCsv);
                }
                if self.data.len() as u64 > max_bytes {
                    errors.push(UploadError::TooLarge {
                        max_mb: max_bytes / (1024 * 1024),
                    });
                } else if self.data.is_empty() {
                    errors.push(UploadError::EmptyFile);
                }
            }
        }

        if let Some(raw) = self.chunk_size.as_deref().map(str::trim) {
            if !raw.is_empty() {
                let in_range = raw
                    .parse::<usize>()
                    .is_ok_and(|n| CHUNK_SIZE_RANGE.contains(&n));
                if !in_range {
                    errors.push(UploadError::ChunkSize {
                        min: *CHUNK_SIZE_RANGE.start(),
                        max: *CHUNK_SIZE_RANGE.end(),
                    });
                }
            }
        }

        if self
            .text_column
            .as_deref()
            .is_some_and(|c| c.trim().is_empty())
        {
            errors.push(UploadError::EmptyColumn);
        }

        if let Some(format) = self.export_format.as_deref() {
            if ExportSelection::from_str(format).is_none() {
                errors.push(UploadError::UnknownExport(format.to_string()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

fn reject(
    state: &AppState,
    headers: &HeaderMap,
    options: &ProcessingOptions,
    errors: Vec<UploadError>,
) -> Response {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    tracing::info!("Upload rejected: {}", messages.join("; "));

    if wants_json(headers) {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "errors": messages })),
        )
            .into_response();
    }
    (
        StatusCode::BAD_REQUEST,
        render(&upload_page(state, options, messages)),
    )
        .into_response()
}

/// Accept an upload, start processing and redirect to its progress page.
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let max_bytes = state.settings.max_upload_bytes;
    let default_chunk = state.settings.default_chunk_size;

    let form = match UploadForm::read(&mut multipart, max_bytes).await {
        Ok(form) => form,
        Err(e) => {
            let options = ProcessingOptions {
                chunk_size: default_chunk,
                ..Default::default()
            };
            return reject(&state, &headers, &options, vec![e]);
        }
    };

    let options = form.options(default_chunk);
    if let Err(errors) = form.validate(max_bytes) {
        return reject(&state, &headers, &options, errors);
    }

    let original = form.filename.clone().unwrap_or_default();
    let stored_name = format!(
        "{}_{}",
        uuid::Uuid::new_v4().simple(),
        secure_filename(&original)
    );
    let upload_path = state.settings.upload_dir.join(stored_name);

    if let Err(e) = tokio::fs::create_dir_all(&state.settings.upload_dir).await {
        tracing::error!("Failed to create upload dir: {}", e);
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save upload");
    }
    if let Err(e) = tokio::fs::write(&upload_path, &form.data).await {
        tracing::error!("Failed to save upload {}: {}", upload_path.display(), e);
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save upload");
    }

    let session_id = match state
        .sessions
        .create(original, upload_path.clone(), options.clone())
    {
        Ok(id) => id,
        Err(e) => {
            tracing::error!("Failed to register session: {}", e);
            let _ = tokio::fs::remove_file(&upload_path).await;
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to start processing");
        }
    };

    spawn_session(
        state.sessions.clone(),
        state.processor.clone(),
        ProcessingJob {
            session_id: session_id.clone(),
            input_path: upload_path,
            output_dir: state.settings.download_dir.join(&session_id),
            options,
        },
    );

    let location = format!("/processing/{}", session_id);
    if wants_json(&headers) {
        return (
            StatusCode::ACCEPTED,
            [(header::LOCATION, location.clone())],
            Json(serde_json::json!({
                "session_id": session_id,
                "processing_url": location,
                "status_url": format!("/api/status/{}", session_id),
            })),
        )
            .into_response();
    }
    Redirect::to(&location).into_response()
}
