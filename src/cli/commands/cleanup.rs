//! Offline removal of expired uploads and exports.

use std::time::Duration;

use console::style;

use crate::cli::icons::success;
use crate::config::Settings;
use crate::utils::cleanup_old_files;

/// Remove files older than `hours` (default: the retention window).
pub async fn cmd_cleanup(settings: &Settings, hours: Option<u64>) -> anyhow::Result<()> {
    let max_age = hours
        .map(|h| Duration::from_secs(h * 3600))
        .unwrap_or_else(|| settings.retention());

    let dirs = [settings.upload_dir.clone(), settings.download_dir.clone()];
    let counts = tokio::task::spawn_blocking(move || {
        dirs.iter()
            .map(|dir| cleanup_old_files(dir, max_age).map(|n| (dir.clone(), n)))
            .collect::<std::io::Result<Vec<_>>>()
    })
    .await??;

    for (dir, removed) in counts {
        println!(
            "{} {} removed from {}",
            success(),
            style(removed).bold(),
            dir.display()
        );
    }
    Ok(())
}
