//! Terminal rendering for the CLI `watch` and `submit` commands.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use super::{Navigator, PollError, PollerView};
use crate::models::SessionStatus;

/// Progress bar view of one session.
pub struct TerminalView {
    bar: ProgressBar,
    upload_url: String,
}

impl TerminalView {
    pub fn new(server_url: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Self {
            bar,
            upload_url: format!("{}/upload", server_url.trim_end_matches('/')),
        }
    }
}

impl PollerView for TerminalView {
    fn show_progress(&mut self, percent: u8, message: &str, status: SessionStatus) {
        self.bar.set_position(u64::from(percent));
        if status == SessionStatus::Pending && message.is_empty() {
            self.bar.set_message("Waiting to start...");
        } else {
            self.bar.set_message(message.to_string());
        }
    }

    fn show_success(&mut self) {
        self.bar.set_position(100);
        self.bar
            .finish_with_message(format!("{}", style("Processing complete!").green()));
    }

    fn show_failure(&mut self, message: &str) {
        self.bar.abandon();
        eprintln!("{} {}", style("✗").red(), message);
        eprintln!(
            "  {} Try again: {}",
            style("→").dim(),
            style(&self.upload_url).cyan()
        );
    }

    fn show_connection_error(&mut self, error: &PollError) {
        self.bar.println(format!(
            "{} {} ({})",
            style("!").yellow(),
            error.user_notice(),
            style(error).dim()
        ));
    }
}

impl Drop for TerminalView {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

/// Prints the results URL instead of opening a browser.
pub struct ResultsLink {
    base_url: String,
}

impl ResultsLink {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, target: &str) -> String {
        format!("{}{}", self.base_url, target)
    }
}

impl Navigator for ResultsLink {
    fn navigate(&mut self, target: &str) {
        println!(
            "{} Results: {}",
            style("✓").green(),
            style(self.url_for(target)).cyan()
        );
    }
}
