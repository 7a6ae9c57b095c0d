//! In-memory session store.
//!
//! Every session write goes through this store, which is what keeps the
//! session invariants true:
//! - `result` is set only together with COMPLETED, `error_detail` only with ERROR
//! - once terminal, a session never changes again
//! - progress never moves backwards
//!
//! Readers get clones; nothing outside the store holds a mutable reference.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;

use crate::models::{
    ProcessingOptions, ProcessingSession, SessionResult, SessionStatus, StatusSnapshot,
};

/// Errors returned by session store writes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session {id} is already {status} and cannot change")]
    Terminal { id: String, status: SessionStatus },

    #[error("Session store lock poisoned")]
    Poisoned,
}

/// Shared store of processing sessions keyed by session id.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, ProcessingSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a PENDING session for an accepted upload.
    pub fn create(
        &self,
        filename: String,
        upload_path: PathBuf,
        options: ProcessingOptions,
    ) -> Result<String, SessionStoreError> {
        let id = self.insert(ProcessingSession::new(filename, upload_path, options))?;
        tracing::info!(session_id = %id, "Session accepted");
        Ok(id)
    }

    /// Register a session. Returns its id.
    pub fn insert(&self, session: ProcessingSession) -> Result<String, SessionStoreError> {
        let id = session.session_id.clone();
        let mut guard = self
            .sessions
            .write()
            .map_err(|_| SessionStoreError::Poisoned)?;
        guard.insert(id.clone(), session);
        Ok(id)
    }

    /// Full session record, if known.
    pub fn get(&self, id: &str) -> Option<ProcessingSession> {
        self.sessions
            .read()
            .ok()
            .and_then(|guard| guard.get(id).cloned())
    }

    /// Status snapshot for pollers, if known.
    pub fn snapshot(&self, id: &str) -> Option<StatusSnapshot> {
        self.sessions
            .read()
            .ok()
            .and_then(|guard| guard.get(id).map(|s| s.snapshot()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions
            .read()
            .map(|guard| guard.contains_key(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to a non-terminal session.
    fn mutate<F>(&self, id: &str, f: F) -> Result<(), SessionStoreError>
    where
        F: FnOnce(&mut ProcessingSession),
    {
        let mut guard = self
            .sessions
            .write()
            .map_err(|_| SessionStoreError::Poisoned)?;
        let session = guard
            .get_mut(id)
            .ok_or_else(|| SessionStoreError::NotFound(id.to_string()))?;
        if session.is_terminal() {
            return Err(SessionStoreError::Terminal {
                id: id.to_string(),
                status: session.status,
            });
        }
        f(session);
        Ok(())
    }

    /// Move a PENDING session to RUNNING without changing its progress.
    pub fn mark_running(&self, id: &str) -> Result<(), SessionStoreError> {
        self.mutate(id, |session| session.status = SessionStatus::Running)
    }

    /// Record a progress step. Moves PENDING to RUNNING.
    ///
    /// `progress` is clamped to 100 and ignored if lower than the current
    /// value; `None` keeps the current percentage.
    pub fn update_progress(
        &self,
        id: &str,
        message: impl Into<String>,
        progress: Option<u8>,
    ) -> Result<(), SessionStoreError> {
        let message = message.into();
        self.mutate(id, |session| {
            session.status = SessionStatus::Running;
            if let Some(p) = progress {
                session.progress = session.progress.max(p.min(100));
            }
            tracing::debug!(
                session_id = %session.session_id,
                progress = session.progress,
                "{}",
                message
            );
            session.message = message;
        })
    }

    /// Mark a session COMPLETED with its result descriptor.
    pub fn complete(&self, id: &str, result: SessionResult) -> Result<(), SessionStoreError> {
        self.mutate(id, |session| {
            session.status = SessionStatus::Completed;
            session.progress = 100;
            session.message = "Processing complete!".to_string();
            session.end_time = Some(Utc::now());
            session.result = Some(result);
            session.error_detail = None;
        })?;
        tracing::info!(session_id = %id, "Session completed");
        Ok(())
    }

    /// Mark a session ERROR. `detail` is shown to the user verbatim.
    pub fn fail(&self, id: &str, detail: impl Into<String>) -> Result<(), SessionStoreError> {
        let detail = detail.into();
        self.mutate(id, |session| {
            session.status = SessionStatus::Error;
            session.message = detail.clone();
            session.end_time = Some(Utc::now());
            session.error_detail = Some(detail.clone());
            session.result = None;
        })?;
        tracing::warn!(session_id = %id, "Session failed: {}", detail);
        Ok(())
    }

    /// Remove finished sessions whose run ended more than `max_age` ago.
    /// Sessions still pending or running are kept. Returns what was removed
    /// so the caller can delete associated files.
    pub fn expire_older_than(&self, max_age: Duration) -> Vec<ProcessingSession> {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return Vec::new();
        };
        let cutoff = Utc::now() - max_age;

        let Ok(mut guard) = self.sessions.write() else {
            return Vec::new();
        };
        let expired: Vec<String> = guard
            .iter()
            .filter(|(_, s)| s.is_terminal())
            .filter(|(_, s)| s.end_time.unwrap_or(s.start_time) < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| guard.remove(&id))
            .inspect(|s| tracing::info!(session_id = %s.session_id, "Session expired"))
            .collect()
    }
}
