//! Processing backend.
//!
//! A [`Processor`] turns an uploaded file into a [`SessionResult`], reporting
//! progress as it goes. [`spawn_session`] runs one in the background and
//! records the outcome in the [`SessionStore`].

mod clean;
mod csv;
mod export;
mod pipeline;

pub use clean::{
    clean_noise, normalize_text, scrub_cell, Normalized, MAX_TEXT_CHARS, TRUNCATION_MARKER,
};
pub use csv::{decode, parse_rows, sniff_separator, Table};
pub use export::{export_table, write_json, JSON_RECORD_LIMIT};
pub use pipeline::ChunkedCsvProcessor;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::models::{ProcessingOptions, SessionResult};
use crate::session_store::SessionStore;

/// Errors that end a processing run. The display text is what the user sees.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Only the file name reaches the user; the full path is logged.
    #[error("Failed to access {}: {source}", file_label(.path))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("The uploaded file is empty")]
    EmptyFile,

    #[error("The uploaded file has no data rows")]
    NoRows,

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Processing task failed: {0}")]
    Task(String),
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

/// One unit of work handed to a processor.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub session_id: String,
    pub input_path: PathBuf,
    /// Where this job's exports go.
    pub output_dir: PathBuf,
    pub options: ProcessingOptions,
}

/// Receives progress steps from a running processor.
pub trait ProgressSink: Send + Sync {
    fn report(&self, message: &str, progress: Option<u8>);
}

/// Pluggable processing backend.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        job: ProcessingJob,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<SessionResult, ProcessingError>;
}

/// Forwards progress into the session store.
struct StoreProgress {
    store: Arc<SessionStore>,
    session_id: String,
}

impl ProgressSink for StoreProgress {
    fn report(&self, message: &str, progress: Option<u8>) {
        if let Err(e) = self
            .store
            .update_progress(&self.session_id, message, progress)
        {
            tracing::debug!(session_id = %self.session_id, "Dropped progress update: {}", e);
        }
    }
}

/// Run `job` in the background and record its outcome.
///
/// The uploaded file is removed once the run ends, whatever the outcome.
pub fn spawn_session(
    store: Arc<SessionStore>,
    processor: Arc<dyn Processor>,
    job: ProcessingJob,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let session_id = job.session_id.clone();
        let input_path = job.input_path.clone();

        if let Err(e) = store.mark_running(&session_id) {
            tracing::warn!(session_id = %session_id, "Not starting processing: {}", e);
            return;
        }

        let sink: Arc<dyn ProgressSink> = Arc::new(StoreProgress {
            store: store.clone(),
            session_id: session_id.clone(),
        });

        let recorded = match processor.process(job, sink).await {
            Ok(result) => store.complete(&session_id, result),
            Err(e) => {
                if let ProcessingError::Io { ref path, .. } = e {
                    tracing::error!(session_id = %session_id, "I/O failure on {}", path.display());
                }
                store.fail(&session_id, e.to_string())
            }
        };
        if let Err(e) = recorded {
            tracing::warn!(session_id = %session_id, "Outcome not recorded: {}", e);
        }

        if let Err(e) = tokio::fs::remove_file(&input_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove upload {}: {}", input_path.display(), e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownloadInfo, ProcessingStats, SessionStatus};
    use std::path::Path;

    struct Scripted(Result<(), &'static str>);

    #[async_trait]
    impl Processor for Scripted {
        async fn process(
            &self,
            _job: ProcessingJob,
            progress: Arc<dyn ProgressSink>,
        ) -> Result<SessionResult, ProcessingError> {
            progress.report("Working...", Some(50));
            match self.0 {
                Ok(()) => Ok(SessionResult {
                    stats: ProcessingStats::default(),
                    download_info: DownloadInfo::new(vec![]),
                }),
                Err(column) => Err(ProcessingError::MissingColumn(column.to_string())),
            }
        }
    }

    fn job(store: &SessionStore, dir: &Path) -> ProcessingJob {
        let input_path = dir.join("upload.csv");
        std::fs::write(&input_path, "obs\nx\n").unwrap();
        let options = ProcessingOptions::default();
        let session_id = store
            .create("upload.csv".into(), input_path.clone(), options.clone())
            .unwrap();
        ProcessingJob {
            session_id,
            input_path,
            output_dir: dir.join("out"),
            options,
        }
    }

    #[tokio::test]
    async fn test_spawn_session_completes_and_removes_upload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new());
        let job = job(&store, dir.path());
        let (id, input) = (job.session_id.clone(), job.input_path.clone());

        spawn_session(store.clone(), Arc::new(Scripted(Ok(()))), job)
            .await
            .unwrap();

        let session = store.get(&id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.result.is_some());
        assert!(!input.exists());
    }

    #[test]
    fn test_io_error_hides_upload_directory() {
        let err = ProcessingError::Io {
            path: PathBuf::from("/srv/data/uploads/abc_notes.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        let message = err.to_string();
        assert_eq!(message, "Failed to access abc_notes.csv: missing");
        assert!(!message.contains("/srv/data"));
    }

    #[tokio::test]
    async fn test_spawn_session_records_failure_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SessionStore::new());
        let job = job(&store, dir.path());
        let id = job.session_id.clone();

        spawn_session(store.clone(), Arc::new(Scripted(Err("obs"))), job)
            .await
            .unwrap();

        let snap = store.snapshot(&id).unwrap();
        assert_eq!(snap.status, SessionStatus::Error);
        assert_eq!(snap.message, "Column 'obs' not found");
    }
}
