//! Web server for uploading CSV files and following their processing.
//!
//! Provides:
//! - An upload form that starts a background processing session
//! - A processing page driven by the browser status poller
//! - A JSON status endpoint the poller (browser or CLI) queries
//! - A results page with export downloads

mod assets;
mod handlers;
mod retention;
mod routes;
mod template_structs;

pub use handlers::UploadError;
pub use retention::{spawn_retention_task, sweep_expired, SweepReport};
pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::processing::{ChunkedCsvProcessor, Processor};
use crate::session_store::SessionStore;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: Arc<SessionStore>,
    pub processor: Arc<dyn Processor>,
}

impl AppState {
    /// State backed by the built-in CSV processor.
    pub fn new(settings: Settings) -> Self {
        Self::with_processor(settings, Arc::new(ChunkedCsvProcessor))
    }

    pub fn with_processor(settings: Settings, processor: Arc<dyn Processor>) -> Self {
        Self {
            settings: Arc::new(settings),
            sessions: Arc::new(SessionStore::new()),
            processor,
        }
    }
}

/// Start the web server and run until Ctrl-C.
pub async fn serve(settings: Settings, host: &str, port: u16) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let state = AppState::new(settings);

    let shutdown = CancellationToken::new();
    let retention = spawn_retention_task(state.clone(), shutdown.clone());
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down");
            }
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = retention.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::time::Duration;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::models::{
        DownloadFile, DownloadInfo, ProcessingOptions, ProcessingStats, SessionResult,
        SessionStatus,
    };

    const BOUNDARY: &str = "XBIBLIOTECARIOX";

    fn setup_test_app() -> (axum::Router, AppState, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let settings = Settings::with_data_dir(dir.path().to_path_buf());
        settings.ensure_directories().unwrap();
        let state = AppState::new(settings);
        (create_router(state.clone()), state, dir)
    }

    fn multipart_body(filename: &str, csv: &str, fields: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n"
        ));
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        body
    }

    fn upload_request(body: String, json: bool) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if json {
            builder = builder.header(header::ACCEPT, "application/json");
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn get(app: &axum::Router, uri: &str) -> axum::response::Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn wait_for_terminal(state: &AppState, id: &str) -> SessionStatus {
        for _ in 0..200 {
            let status = state.sessions.snapshot(id).unwrap().status;
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("session {id} never finished");
    }

    #[tokio::test]
    async fn test_status_unknown_session() {
        let (app, _state, _dir) = setup_test_app();
        let response = get(&app, "/api/status/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Session not found");
    }

    #[tokio::test]
    async fn test_status_snapshot() {
        let (app, state, _dir) = setup_test_app();
        let id = state
            .sessions
            .create(
                "a.csv".into(),
                "/tmp/a.csv".into(),
                ProcessingOptions::default(),
            )
            .unwrap();
        state
            .sessions
            .update_progress(&id, "Reading CSV file...", Some(20))
            .unwrap();

        let response = get(&app, &format!("/api/status/{id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
        let json = body_json(response).await;
        assert_eq!(json["status"], "running");
        assert_eq!(json["progress"], 20.0);
        assert_eq!(json["message"], "Reading CSV file...");
    }

    #[tokio::test]
    async fn test_processing_page_redirects_unknown() {
        let (app, _state, _dir) = setup_test_app();
        let response = get(&app, "/processing/missing").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
    }

    #[tokio::test]
    async fn test_processing_page_carries_poller_settings() {
        let (app, state, _dir) = setup_test_app();
        let id = state
            .sessions
            .create(
                "a.csv".into(),
                "/tmp/a.csv".into(),
                ProcessingOptions::default(),
            )
            .unwrap();

        let response = get(&app, &format!("/processing/{id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains(&format!("data-session-id=\"{id}\"")));
        assert!(html.contains("data-interval-ms=\"2000\""));
        assert!(html.contains("/static/poller.js"));
    }

    #[tokio::test]
    async fn test_results_before_completion_redirects() {
        let (app, state, _dir) = setup_test_app();
        let id = state
            .sessions
            .create(
                "a.csv".into(),
                "/tmp/a.csv".into(),
                ProcessingOptions::default(),
            )
            .unwrap();

        let response = get(&app, &format!("/results/{id}")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            &format!("/processing/{id}")
        );

        let response = get(&app, &format!("/download/{id}/json")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_missing_format() {
        let (app, state, dir) = setup_test_app();
        let id = state
            .sessions
            .create(
                "a.csv".into(),
                "/tmp/a.csv".into(),
                ProcessingOptions::default(),
            )
            .unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "{}").unwrap();
        state
            .sessions
            .complete(
                &id,
                SessionResult {
                    stats: ProcessingStats::default(),
                    download_info: DownloadInfo::new(vec![DownloadFile {
                        format: "JSON".into(),
                        filename: "out.json".into(),
                        path,
                        size_bytes: 2,
                    }]),
                },
            )
            .unwrap();

        let response = get(&app, &format!("/download/{id}/excel")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = get(&app, "/download/unknown/json").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = get(&app, &format!("/download/{id}/JSON")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_csv() {
        let (app, state, _dir) = setup_test_app();
        let body = multipart_body("data.txt", "obs\nx\n", &[]);
        let response = app.oneshot(upload_request(body, true)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["errors"][0], "Only CSV files are allowed");
        assert!(state.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_upload_form_rerendered_with_errors() {
        let (app, _state, _dir) = setup_test_app();
        let body = multipart_body("data.csv", "obs\nx\n", &[("chunk_size", "5")]);
        let response = app.oneshot(upload_request(body, false)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8_lossy(&body);
        assert!(html.contains("Chunk size must be between 100 and 10000"));
    }

    #[tokio::test]
    async fn test_upload_redirects_to_processing() {
        let (app, state, _dir) = setup_test_app();
        let body = multipart_body("data.csv", "obs\nhello\n", &[]);
        let response = app.oneshot(upload_request(body, false)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response
            .headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let id = location.trim_start_matches("/processing/");
        assert!(state.sessions.contains(id));
    }

    #[tokio::test]
    async fn test_upload_process_and_download() {
        let (app, state, _dir) = setup_test_app();
        let csv = "id,notes\n1,Router rebooted\n2,Fan replaced\n3,\n";
        let body = multipart_body(
            "field notes.csv",
            csv,
            &[
                ("text_column", "notes"),
                ("chunk_size", "100"),
                ("export_format", "json"),
                ("enable_cleaning", "on"),
            ],
        );
        let response = app
            .clone()
            .oneshot(upload_request(body, true))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        let id = json["session_id"].as_str().unwrap().to_string();
        assert_eq!(json["status_url"], format!("/api/status/{id}"));

        assert_eq!(
            wait_for_terminal(&state, &id).await,
            SessionStatus::Completed
        );
        let snapshot = body_json(get(&app, &format!("/api/status/{id}")).await).await;
        assert_eq!(snapshot["progress"], 100.0);
        assert_eq!(snapshot["message"], "Processing complete!");

        let response = get(&app, &format!("/results/{id}")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(&app, &format!("/download/{id}/json")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment;"));
        let export = body_json(response).await;
        assert!(export["data"].is_array());

        // Upload is removed once processing ends.
        let session = state.sessions.get(&id).unwrap();
        assert!(!session.upload_path.exists());
    }

    #[tokio::test]
    async fn test_upload_missing_column_fails_session() {
        let (app, state, _dir) = setup_test_app();
        let body = multipart_body("data.csv", "a,b\n1,2\n", &[("text_column", "obs")]);
        let response = app
            .clone()
            .oneshot(upload_request(body, true))
            .await
            .unwrap();
        let id = body_json(response).await["session_id"]
            .as_str()
            .unwrap()
            .to_string();

        assert_eq!(wait_for_terminal(&state, &id).await, SessionStatus::Error);
        let snapshot = body_json(get(&app, &format!("/api/status/{id}")).await).await;
        assert_eq!(snapshot["status"], "error");
        assert_eq!(snapshot["message"], "Column 'obs' not found");
    }

    #[tokio::test]
    async fn test_static_assets() {
        let (app, _state, _dir) = setup_test_app();
        let response = get(&app, "/static/poller.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/javascript"
        );
        let response = get(&app, "/static/style.css").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_index_and_upload_pages() {
        let (app, _state, _dir) = setup_test_app();
        assert_eq!(get(&app, "/").await.status(), StatusCode::OK);
        let response = get(&app, "/upload").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&body).contains("name=\"export_format\""));
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_sessions() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::with_data_dir(dir.path().to_path_buf());
        settings.retention_hours = 0;
        settings.ensure_directories().unwrap();
        let state = AppState::new(settings);

        let id = state
            .sessions
            .create(
                "a.csv".into(),
                dir.path().join("uploads/a.csv"),
                ProcessingOptions::default(),
            )
            .unwrap();
        state.sessions.fail(&id, "Column 'obs' not found").unwrap();
        let export_dir = state.settings.download_dir.join(&id);
        std::fs::create_dir_all(&export_dir).unwrap();
        std::fs::write(export_dir.join("x.json"), "{}").unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let report = sweep_expired(&state).await;
        assert_eq!(report.sessions, 1);
        assert!(!state.sessions.contains(&id));
        assert!(!export_dir.exists());
    }
}
