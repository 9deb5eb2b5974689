//! Gateway-originated responses.
//!
//! # Responsibilities
//! - The transport-failure envelope `{"error": "..."}`
//! - The structured error body `{timestamp, status, error, message, path}`
//! - A generic HTML error view for page-level failures
//!
//! Backend responses never pass through here; they are relayed verbatim.

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured error produced by the gateway itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// JSON body of a synthesized transport failure.
pub fn transport_failure_body(message: &str) -> Vec<u8> {
    serde_json::json!({ "error": message }).to_string().into_bytes()
}

/// True for AJAX / API style requests that expect JSON errors.
pub fn wants_json(path: &str, headers: &HeaderMap) -> bool {
    if path.starts_with("/api/") {
        return true;
    }
    let ajax = headers
        .get("x-requested-with")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"));
    let accepts_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json") && !v.contains("text/html"));
    ajax || accepts_json
}

/// Generic error page for browser navigations.
pub fn error_view(status: StatusCode, message: &str) -> Response {
    let title = status.canonical_reason().unwrap_or("Error");
    let body = format!(
        "<!DOCTYPE html>\n<html><head><title>{code} {title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p><p><a href=\"/dashboard\">Back to dashboard</a></p></body></html>\n",
        code = status.as_u16(),
        title = escape_html(title),
        message = escape_html(message),
    );
    (status, Html(body)).into_response()
}

/// Error rendered the way the caller expects: JSON for API calls, a view for pages.
pub fn error_for(path: &str, headers: &HeaderMap, error: ApiError) -> Response {
    if wants_json(path, headers) {
        error.into_response()
    } else {
        error_view(error.status_code(), &error.message)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn envelope_escapes_message() {
        let body = transport_failure_body("Connection refused \"127.0.0.1\"");
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({ "error": "Connection refused \"127.0.0.1\"" }));
    }

    #[test]
    fn api_error_serializes_all_fields() {
        let err = ApiError::new(StatusCode::BAD_REQUEST, "orderIds must be numeric", "/api/invoices/download");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["status"], 400);
        assert_eq!(value["error"], "Bad Request");
        assert_eq!(value["message"], "orderIds must be numeric");
        assert_eq!(value["path"], "/api/invoices/download");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn api_paths_and_ajax_want_json() {
        let empty = HeaderMap::new();
        assert!(wants_json("/api/order/all", &empty));
        assert!(!wants_json("/orders", &empty));

        let mut ajax = HeaderMap::new();
        ajax.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        assert!(wants_json("/orders", &ajax));

        let mut browser = HeaderMap::new();
        browser.insert(header::ACCEPT, HeaderValue::from_static("text/html,application/json;q=0.9"));
        assert!(!wants_json("/orders", &browser));
    }

    #[test]
    fn html_is_escaped() {
        assert_eq!(escape_html("<b>&'\""), "&lt;b&gt;&amp;&#39;&quot;");
    }
}
