//! Follow a running session from the terminal.

use console::style;
use tokio_util::sync::CancellationToken;

use crate::cli::icons::{error, warning};
use crate::config::Settings;
use crate::poller::{
    session_id_from_ref, HttpStatusSource, PollOutcome, Poller, ResultsLink, TerminalView,
};

/// Poll `session` until it completes, fails or the user presses Ctrl-C.
pub async fn cmd_watch(settings: &Settings, session: &str) -> anyhow::Result<()> {
    let Some(session_id) = session_id_from_ref(session) else {
        anyhow::bail!("Not a session id or processing URL: {}", session);
    };
    watch_session(settings, &session_id).await
}

pub(super) async fn watch_session(settings: &Settings, session_id: &str) -> anyhow::Result<()> {
    let source = HttpStatusSource::new(&settings.server_url, settings.poller.request_timeout())?;
    let view = TerminalView::new(&settings.server_url);
    let navigator = ResultsLink::new(&settings.server_url);

    let interrupt = CancellationToken::new();
    let ctrl_c = interrupt.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    println!(
        "{} Watching session {}",
        style("→").dim(),
        style(session_id).cyan()
    );

    let outcome = Poller::new(
        session_id,
        source,
        view,
        navigator,
        settings.poller.clone(),
    )
    .with_cancellation(&interrupt)
    .spawn()
    .wait()
    .await;

    match outcome {
        PollOutcome::Completed { .. } => Ok(()),
        PollOutcome::Failed { message } => {
            anyhow::bail!("Processing failed: {}", message)
        }
        PollOutcome::Cancelled => {
            eprintln!("{} Stopped watching", warning());
            Ok(())
        }
        PollOutcome::GaveUp { attempts } => {
            eprintln!(
                "{} Server unreachable after {} attempts",
                error(),
                attempts
            );
            anyhow::bail!("Gave up polling {}", session_id)
        }
    }
}
