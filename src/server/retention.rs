//! Periodic expiry of old sessions and their files.

use tokio_util::sync::CancellationToken;

use super::AppState;

/// What one sweep removed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: usize,
    pub files: usize,
}

/// Expire sessions past retention, then clear stale files left on disk.
pub async fn sweep_expired(state: &AppState) -> SweepReport {
    let retention = state.settings.retention();
    let expired = state.sessions.expire_older_than(retention);
    let mut report = SweepReport {
        sessions: expired.len(),
        files: 0,
    };

    for session in &expired {
        let export_dir = state.settings.download_dir.join(&session.session_id);
        match tokio::fs::remove_dir_all(&export_dir).await {
            Ok(()) => report.files += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                session_id = %session.session_id,
                "Failed to remove {}: {}",
                export_dir.display(),
                e
            ),
        }
        if tokio::fs::remove_file(&session.upload_path).await.is_ok() {
            report.files += 1;
        }
    }

    let dirs = [
        state.settings.upload_dir.clone(),
        state.settings.download_dir.clone(),
    ];
    let swept = tokio::task::spawn_blocking(move || {
        dirs.iter()
            .map(|dir| match crate::utils::cleanup_old_files(dir, retention) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Cleanup of {} failed: {}", dir.display(), e);
                    0
                }
            })
            .sum::<usize>()
    })
    .await
    .unwrap_or(0);
    report.files += swept;

    if report.sessions > 0 || report.files > 0 {
        tracing::info!(
            "Retention sweep removed {} sessions and {} files",
            report.sessions,
            report.files
        );
    }
    report
}

/// Run [`sweep_expired`] every `cleanup_interval` until `shutdown` fires.
pub fn spawn_retention_task(
    state: AppState,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.settings.cleanup_interval());
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    sweep_expired(&state).await;
                }
            }
        }
        tracing::debug!("Retention task stopped");
    })
}
