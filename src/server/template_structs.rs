//! Askama template structs for the web interface.
//!
//! Each struct corresponds to an HTML template in the templates/ directory.

use askama::Template;

use crate::config::PollerSettings;
use crate::models::{ExportSelection, ProcessingSession, SessionResult};
use crate::utils::{format_elapsed, format_size};

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate<'a> {
    pub title: &'a str,
    pub active_sessions: usize,
    pub retention_hours: u64,
}

/// One `<option>` of the export selector.
pub struct ExportChoice {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

impl ExportChoice {
    pub fn all(selected: ExportSelection) -> Vec<Self> {
        ExportSelection::CHOICES
            .iter()
            .map(|(choice, label)| Self {
                value: choice.as_str(),
                label: *label,
                selected: *choice == selected,
            })
            .collect()
    }
}

#[derive(Template)]
#[template(path = "upload.html")]
pub struct UploadTemplate<'a> {
    pub title: &'a str,
    pub errors: Vec<String>,
    pub text_column: &'a str,
    pub chunk_size: usize,
    pub chunk_min: usize,
    pub chunk_max: usize,
    pub export_choices: Vec<ExportChoice>,
    pub enable_cleaning: bool,
    pub max_upload_mb: u64,
}

#[derive(Template)]
#[template(path = "processing.html")]
pub struct ProcessingTemplate<'a> {
    pub title: &'a str,
    pub session_id: &'a str,
    pub filename: &'a str,
    pub progress: u8,
    pub message: &'a str,
    pub interval_ms: u64,
    pub completion_delay_ms: u64,
    pub recovery_backoff_ms: u64,
    pub request_timeout_ms: u64,
    /// Empty when recovery is unbounded.
    pub max_recoveries: String,
}

impl<'a> ProcessingTemplate<'a> {
    pub fn new(session: &'a ProcessingSession, poller: &PollerSettings) -> Self {
        let snapshot_message = match session.error_detail {
            Some(ref detail) => detail.as_str(),
            None => session.message.as_str(),
        };
        Self {
            title: "Processing",
            session_id: &session.session_id,
            filename: &session.filename,
            progress: session.progress,
            message: snapshot_message,
            interval_ms: poller.interval_ms,
            completion_delay_ms: poller.completion_delay_ms,
            recovery_backoff_ms: poller.recovery_backoff_ms,
            request_timeout_ms: poller.request_timeout_ms,
            max_recoveries: poller
                .max_recoveries
                .map(|n| n.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Label/value row of the results summary.
pub struct StatRow {
    pub label: &'static str,
    pub value: String,
}

/// Download link on the results page.
pub struct FileRow {
    pub format: String,
    pub filename: String,
    pub size_str: String,
    pub href: String,
}

#[derive(Template)]
#[template(path = "results.html")]
pub struct ResultsTemplate<'a> {
    pub title: &'a str,
    pub session_id: &'a str,
    pub filename: &'a str,
    pub elapsed: String,
    pub stats: Vec<StatRow>,
    pub warnings: &'a [String],
    pub files: Vec<FileRow>,
    pub columns: &'a [String],
}

impl<'a> ResultsTemplate<'a> {
    pub fn new(session: &'a ProcessingSession, result: &'a SessionResult) -> Self {
        let stats = &result.stats;
        let elapsed = session
            .end_time
            .and_then(|end| (end - session.start_time).to_std().ok())
            .map(format_elapsed)
            .unwrap_or_else(|| "-".to_string());

        let rows = vec![
            StatRow {
                label: "Rows read",
                value: stats.total_rows.to_string(),
            },
            StatRow {
                label: "Rows processed",
                value: stats.processed_rows.to_string(),
            },
            StatRow {
                label: "Rows with text",
                value: format!("{:.1}%", stats.fill_rate()),
            },
            StatRow {
                label: "Rows cleaned",
                value: stats.cleaned_rows.to_string(),
            },
            StatRow {
                label: "Rows truncated",
                value: stats.truncated_rows.to_string(),
            },
            StatRow {
                label: "Chunks",
                value: stats.chunks.to_string(),
            },
        ];

        let files = result
            .download_info
            .files
            .iter()
            .map(|f| FileRow {
                format: f.format.clone(),
                filename: f.filename.clone(),
                size_str: format_size(f.size_bytes),
                href: format!(
                    "/download/{}/{}",
                    session.session_id,
                    f.format.to_lowercase()
                ),
            })
            .collect();

        Self {
            title: "Results",
            session_id: &session.session_id,
            filename: &session.filename,
            elapsed,
            stats: rows,
            warnings: &stats.warnings,
            files,
            columns: &stats.columns,
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    pub title: &'a str,
    pub message: &'a str,
}
