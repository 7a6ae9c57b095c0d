//! Processing session models.
//!
//! A session tracks one uploaded CSV from acceptance through completion or
//! failure. The server owns the full `ProcessingSession`; clients only ever
//! see a `StatusSnapshot`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle status of a processing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    /// Older backends report this as `processing`.
    #[serde(alias = "processing")]
    Running,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// COMPLETED and ERROR never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Excel,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Json => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "excel" | "xlsx" => Some(Self::Excel),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Export choice offered on the upload form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportSelection {
    Csv,
    Excel,
    #[default]
    Json,
    /// CSV + Excel.
    Both,
    /// CSV + Excel + JSON.
    All,
}

impl ExportSelection {
    pub const CHOICES: [(Self, &'static str); 5] = [
        (Self::Json, "JSON Only"),
        (Self::Csv, "CSV Only"),
        (Self::Excel, "Excel Only"),
        (Self::Both, "CSV + Excel"),
        (Self::All, "All Formats (CSV + Excel + JSON)"),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Json => "json",
            Self::Both => "both",
            Self::All => "all",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(Self::Csv),
            "excel" => Some(Self::Excel),
            "json" => Some(Self::Json),
            "both" => Some(Self::Both),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    /// Expand the selection into concrete formats.
    pub fn formats(&self) -> Vec<ExportFormat> {
        match self {
            Self::Csv => vec![ExportFormat::Csv],
            Self::Excel => vec![ExportFormat::Excel],
            Self::Json => vec![ExportFormat::Json],
            Self::Both => vec![ExportFormat::Csv, ExportFormat::Excel],
            Self::All => vec![ExportFormat::Csv, ExportFormat::Excel, ExportFormat::Json],
        }
    }
}

/// Per-upload processing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingOptions {
    /// Column holding the free-text observations.
    pub text_column: String,
    /// Rows per processing chunk.
    pub chunk_size: usize,
    /// Requested export formats.
    pub export: ExportSelection,
    /// Run noise cleaning on the text column.
    pub enable_cleaning: bool,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            text_column: "obs".to_string(),
            chunk_size: 5000,
            export: ExportSelection::default(),
            enable_cleaning: true,
        }
    }
}

/// Summary statistics produced by the processing pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_rows: usize,
    pub processed_rows: usize,
    pub empty_text_rows: usize,
    pub cleaned_rows: usize,
    pub truncated_rows: usize,
    pub chunks: usize,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ProcessingStats {
    /// Share of rows with usable text, as a percentage.
    pub fn fill_rate(&self) -> f64 {
        if self.processed_rows == 0 {
            return 0.0;
        }
        let filled = self.processed_rows.saturating_sub(self.empty_text_rows);
        filled as f64 * 100.0 / self.processed_rows as f64
    }
}

/// A produced artifact available for download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadFile {
    /// Upper-cased format label ("JSON").
    pub format: String,
    pub filename: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl DownloadFile {
    pub fn size_mb(&self) -> f64 {
        (self.size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
    }
}

/// Manifest of everything a completed session produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub files: Vec<DownloadFile>,
    pub total_files: usize,
    pub timestamp: DateTime<Utc>,
}

impl DownloadInfo {
    pub fn new(files: Vec<DownloadFile>) -> Self {
        Self {
            total_files: files.len(),
            files,
            timestamp: Utc::now(),
        }
    }

    /// Look up a file by its format, case-insensitively.
    pub fn find(&self, format: &str) -> Option<&DownloadFile> {
        self.files
            .iter()
            .find(|f| f.format.eq_ignore_ascii_case(format))
    }
}

/// Result descriptor attached to a COMPLETED session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub stats: ProcessingStats,
    pub download_info: DownloadInfo,
}

/// Server-side record of one upload's processing.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingSession {
    pub session_id: String,
    pub status: SessionStatus,
    /// Percentage in 0..=100.
    pub progress: u8,
    pub message: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Original filename as uploaded.
    pub filename: String,
    #[serde(skip)]
    pub upload_path: PathBuf,
    pub options: ProcessingOptions,
    /// Set only when `status == Completed`.
    pub result: Option<SessionResult>,
    /// Set only when `status == Error`.
    pub error_detail: Option<String>,
}

impl ProcessingSession {
    /// Create a PENDING session with a fresh id.
    pub fn new(filename: String, upload_path: PathBuf, options: ProcessingOptions) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            status: SessionStatus::Pending,
            progress: 0,
            message: "Starting processing...".to_string(),
            start_time: Utc::now(),
            end_time: None,
            filename,
            upload_path,
            options,
            result: None,
            error_detail: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Read-only view handed to pollers.
    pub fn snapshot(&self) -> StatusSnapshot {
        let message = match (&self.status, &self.error_detail) {
            (SessionStatus::Error, Some(detail)) => detail.clone(),
            _ => self.message.clone(),
        };
        StatusSnapshot {
            status: self.status,
            progress: f64::from(self.progress),
            message,
            start_time: Some(self.start_time),
        }
    }
}

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Status tuple returned by a single status query.
///
/// `progress` is accepted as any JSON number since older backends report
/// fractional percentages; use [`StatusSnapshot::percent`] for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    pub fn new(status: SessionStatus, progress: f64, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            start_time: None,
        }
    }

    /// Progress clamped to [0, 100].
    pub fn percent(&self) -> u8 {
        if self.progress.is_nan() {
            return 0;
        }
        self.progress.clamp(0.0, 100.0).round() as u8
    }
}
