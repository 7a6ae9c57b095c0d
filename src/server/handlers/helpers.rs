//! Shared response helpers.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};

use super::super::template_structs::ErrorTemplate;
use crate::utils::html_escape;

/// Render a template, falling back to an escaped plain message.
pub fn render<T: Template>(template: &T) -> Html<String> {
    Html(template.render().unwrap_or_else(|e| {
        tracing::error!("Template error: {}", e);
        format!("<p>Template error: {}</p>", html_escape(&e.to_string()))
    }))
}

/// Rendered error page with a status code.
pub fn error_page(status: StatusCode, title: &str, message: &str) -> Response {
    (status, render(&ErrorTemplate { title, message })).into_response()
}

/// `{"error": message}` with a status code.
pub fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
