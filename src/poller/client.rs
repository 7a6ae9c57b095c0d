//! HTTP status source backed by the server's status endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use super::StatusSource;
use crate::models::StatusSnapshot;

/// Transport-level failures while polling. None of these are terminal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    /// Unknown or expired session.
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Status request failed with HTTP {0}")]
    Http(u16),

    #[error("Status request timed out")]
    Timeout,

    #[error("Malformed status payload: {0}")]
    Malformed(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

impl PollError {
    /// Guidance shown to the user while the poller recovers.
    pub fn user_notice(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "Session not found. Please refresh the page.",
            _ => "Connection error. Please refresh the page.",
        }
    }
}

/// Fetches snapshots from `GET {base_url}/api/status/{id}`.
pub struct HttpStatusSource {
    base_url: String,
    client: Client,
}

impl HttpStatusSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PollError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PollError::Connection(e.to_string()))?;
        Ok(Self::with_client(base_url, client))
    }

    /// Use an existing client (shared connection pool).
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn status_url(&self, session_id: &str) -> String {
        format!("{}/api/status/{}", self.base_url, session_id)
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn fetch(&self, session_id: &str) -> Result<StatusSnapshot, PollError> {
        let resp = self
            .client
            .get(self.status_url(session_id))
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PollError::Timeout
                } else {
                    PollError::Connection(e.to_string())
                }
            })?;

        match resp.status() {
            StatusCode::NOT_FOUND => return Err(PollError::NotFound(session_id.to_string())),
            status if !status.is_success() => return Err(PollError::Http(status.as_u16())),
            _ => {}
        }

        let body = resp.bytes().await.map_err(|e| {
            if e.is_timeout() {
                PollError::Timeout
            } else {
                PollError::Connection(e.to_string())
            }
        })?;

        serde_json::from_slice(&body).map_err(|e| PollError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_url_trims_trailing_slash() {
        let source = HttpStatusSource::with_client("http://localhost:5000/", Client::new());
        assert_eq!(
            source.status_url("abc123"),
            "http://localhost:5000/api/status/abc123"
        );
    }

    #[test]
    fn test_not_found_has_refresh_guidance() {
        assert!(PollError::NotFound("x".into())
            .user_notice()
            .contains("refresh"));
        assert!(PollError::Timeout.user_notice().contains("refresh"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let source =
            HttpStatusSource::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = source.fetch("abc").await.unwrap_err();
        assert!(matches!(err, PollError::Connection(_) | PollError::Timeout));
    }
}
