//! Session status poller.
//!
//! A [`Poller`] owns one session id and drives it to a terminal outcome:
//!
//! ```text
//! POLLING --(running/pending)--> POLLING
//! POLLING --(completed)--> COMPLETED_WAIT --(delay)--> DONE (navigate)
//! POLLING --(error)--> FAILED
//! POLLING --(transport failure)--> RECOVERING --(backoff)--> POLLING
//! ```
//!
//! Requests are strictly sequential: the next poll is scheduled only after
//! the previous response has been handled. Every sleep and request races the
//! poller's cancellation token, and nothing touches the view once it fires.

mod client;
mod session_ref;
mod terminal;

pub use client::{HttpStatusSource, PollError};
pub use session_ref::session_id_from_ref;
pub use terminal::{ResultsLink, TerminalView};

use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PollerSettings;
use crate::models::{SessionStatus, StatusSnapshot};

/// Where snapshots come from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch(&self, session_id: &str) -> Result<StatusSnapshot, PollError>;
}

/// Display side effects. Only the poller calls these.
pub trait PollerView: Send {
    /// Latest snapshot: `percent` is already clamped to 0..=100.
    fn show_progress(&mut self, percent: u8, message: &str, status: SessionStatus);
    fn show_success(&mut self);
    /// `message` is the server's error text, verbatim.
    fn show_failure(&mut self, message: &str);
    fn show_connection_error(&mut self, error: &PollError);
}

/// Performs the single navigation to the results view.
pub trait Navigator: Send {
    fn navigate(&mut self, target: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Polling,
    CompletedWait,
    Done,
    Failed,
    Recovering,
}

impl PollerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::CompletedWait => "completed_wait",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Recovering => "recovering",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// How a poller run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Session completed; navigated to `results_path`.
    Completed { results_path: String },
    /// Session reported ERROR with this message.
    Failed { message: String },
    /// Cancelled by the host before reaching a terminal state.
    Cancelled,
    /// Recovery cap reached after this many consecutive transport failures.
    GaveUp { attempts: u32 },
}

/// Path of the results view for a session.
pub fn results_path(session_id: &str) -> String {
    format!("/results/{}", session_id)
}

/// Sleep unless cancelled first. Returns false on cancellation.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// One request, bounded by `timeout`. `None` on cancellation.
async fn poll_once<S: StatusSource>(
    source: &S,
    session_id: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Option<Result<StatusSnapshot, PollError>> {
    let request = tokio::time::timeout(timeout, source.fetch(session_id));
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = request => Some(result.unwrap_or(Err(PollError::Timeout))),
    }
}

pub struct Poller<S, V, N> {
    session_id: String,
    source: S,
    view: V,
    navigator: N,
    settings: PollerSettings,
    cancel: CancellationToken,
    state: PollerState,
    failures: u32,
}

impl<S, V, N> Poller<S, V, N>
where
    S: StatusSource,
    V: PollerView,
    N: Navigator,
{
    pub fn new(
        session_id: impl Into<String>,
        source: S,
        view: V,
        navigator: N,
        settings: PollerSettings,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            source,
            view,
            navigator,
            settings,
            cancel: CancellationToken::new(),
            state: PollerState::Polling,
            failures: 0,
        }
    }

    /// Tie the poller to a host-owned token (e.g. Ctrl-C handling).
    ///
    /// The poller works on a child token, so finishing never cancels the host's.
    pub fn with_cancellation(mut self, token: &CancellationToken) -> Self {
        self.cancel = token.child_token();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    fn transition(&mut self, next: PollerState) {
        if self.state != next {
            tracing::debug!(
                session_id = %self.session_id,
                from = self.state.as_str(),
                to = next.as_str(),
                "Poller transition"
            );
            self.state = next;
        }
    }

    fn finish(&mut self, state: PollerState, outcome: PollOutcome) -> PollOutcome {
        self.transition(state);
        self.cancel.cancel();
        outcome
    }

    /// Drive the session to a terminal outcome. The first poll is immediate.
    pub async fn run(mut self) -> PollOutcome {
        tracing::info!(session_id = %self.session_id, "Polling session status");

        loop {
            if self.cancel.is_cancelled() {
                return PollOutcome::Cancelled;
            }
            self.transition(PollerState::Polling);

            let polled = poll_once(
                &self.source,
                &self.session_id,
                self.settings.request_timeout(),
                &self.cancel,
            )
            .await;
            let Some(result) = polled else {
                return PollOutcome::Cancelled;
            };

            match result {
                Ok(snapshot) => {
                    self.failures = 0;
                    self.view
                        .show_progress(snapshot.percent(), &snapshot.message, snapshot.status);

                    match snapshot.status {
                        SessionStatus::Pending | SessionStatus::Running => {
                            if !pause(&self.cancel, self.settings.interval()).await {
                                return PollOutcome::Cancelled;
                            }
                        }
                        SessionStatus::Completed => {
                            self.transition(PollerState::CompletedWait);
                            self.view.show_success();
                            if !pause(&self.cancel, self.settings.completion_delay()).await {
                                return PollOutcome::Cancelled;
                            }
                            let target = results_path(&self.session_id);
                            self.navigator.navigate(&target);
                            tracing::info!(session_id = %self.session_id, "Session completed");
                            return self.finish(
                                PollerState::Done,
                                PollOutcome::Completed {
                                    results_path: target,
                                },
                            );
                        }
                        SessionStatus::Error => {
                            self.view.show_failure(&snapshot.message);
                            tracing::warn!(
                                session_id = %self.session_id,
                                "Session failed: {}",
                                snapshot.message
                            );
                            return self.finish(
                                PollerState::Failed,
                                PollOutcome::Failed {
                                    message: snapshot.message,
                                },
                            );
                        }
                    }
                }
                Err(error) => {
                    self.failures += 1;
                    self.transition(PollerState::Recovering);
                    self.view.show_connection_error(&error);
                    tracing::warn!(
                        session_id = %self.session_id,
                        attempt = self.failures,
                        "Status poll failed: {}",
                        error
                    );

                    if let Some(max) = self.settings.max_recoveries {
                        if self.failures > max {
                            let attempts = self.failures;
                            return self.finish(
                                PollerState::Failed,
                                PollOutcome::GaveUp { attempts },
                            );
                        }
                    }

                    if !pause(&self.cancel, self.settings.recovery_backoff()).await {
                        return PollOutcome::Cancelled;
                    }
                }
            }
        }
    }
}

impl<S, V, N> Poller<S, V, N>
where
    S: StatusSource + 'static,
    V: PollerView + 'static,
    N: Navigator + 'static,
{
    /// Run on the runtime, returning a handle that owns cancellation.
    pub fn spawn(self) -> PollerHandle {
        let cancel = self.cancel.clone();
        let join = tokio::spawn(self.run());
        PollerHandle {
            cancel,
            join: Some(join),
        }
    }
}

/// Host-side handle for a spawned poller. Dropping it cancels the poller.
pub struct PollerHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<PollOutcome>>,
}

impl PollerHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    /// Wait for the poller's outcome.
    pub async fn wait(mut self) -> PollOutcome {
        match self.join.take() {
            Some(join) => join.await.unwrap_or(PollOutcome::Cancelled),
            None => PollOutcome::Cancelled,
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
