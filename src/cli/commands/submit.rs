//! Upload a CSV to a running server and follow it.

use std::path::Path;

use console::style;
use reqwest::{header, multipart, redirect::Policy, StatusCode};
use serde::Deserialize;

use crate::cli::icons::{error, success};
use crate::config::Settings;
use crate::models::ProcessingOptions;
use crate::poller::session_id_from_ref;

#[derive(Debug, Deserialize)]
struct Rejection {
    #[serde(default)]
    errors: Vec<String>,
}

/// Submit `file` for processing. Watches the session unless `detach` is set.
pub async fn cmd_submit(
    settings: &Settings,
    file: &Path,
    options: &ProcessingOptions,
    detach: bool,
) -> anyhow::Result<()> {
    let data = tokio::fs::read(file)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.csv".to_string());

    let mut form = multipart::Form::new()
        .text("text_column", options.text_column.clone())
        .text("chunk_size", options.chunk_size.to_string())
        .text("export_format", options.export.as_str());
    if options.enable_cleaning {
        form = form.text("enable_cleaning", "on");
    }
    form = form.part(
        "file",
        multipart::Part::bytes(data)
            .file_name(filename.clone())
            .mime_str("text/csv")?,
    );

    let client = reqwest::Client::builder()
        .redirect(Policy::none())
        .timeout(settings.poller.request_timeout() * 6)
        .build()?;
    let url = format!("{}/upload", settings.server_url.trim_end_matches('/'));

    let response = client
        .post(&url)
        .header(header::ACCEPT, "application/json")
        .multipart(form)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Could not reach {}: {}", url, e))?;

    let status = response.status();
    if status == StatusCode::BAD_REQUEST {
        let rejection: Rejection = response.json().await.unwrap_or(Rejection { errors: vec![] });
        for message in &rejection.errors {
            eprintln!("{} {}", error(), message);
        }
        anyhow::bail!("Upload rejected");
    }
    if !(status.is_success() || status.is_redirection()) {
        anyhow::bail!("Upload failed: HTTP {}", status.as_u16());
    }

    let session_id = response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .and_then(session_id_from_ref)
        .ok_or_else(|| anyhow::anyhow!("Server did not return a session"))?;

    println!(
        "{} Uploaded {} as session {}",
        success(),
        style(&filename).bold(),
        style(&session_id).cyan()
    );

    if detach {
        println!(
            "  {} {}/processing/{}",
            style("→").dim(),
            settings.server_url.trim_end_matches('/'),
            session_id
        );
        return Ok(());
    }
    super::watch::watch_session(settings, &session_id).await
}
