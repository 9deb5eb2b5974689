//! Invoice downloads.
//!
//! The PDF is opaque here: ids are validated, auth is forwarded as both the
//! cookie header and a bearer token, and the bytes come back with the
//! backend's headers.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use url::form_urlencoded;

use crate::http::response::{self, ApiError};
use crate::http::server::AppState;
use crate::proxy::relay::{InboundRequest, ProxyResponse, RelayOptions};

const BACKEND_PATH: &str = "/invoices/download";

/// Parse `1,2,3`. Every id must be a non-negative integer; the list may not be empty.
pub fn parse_order_ids(raw: &str) -> Result<Vec<u64>, String> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .map(|id| {
            id.parse::<u64>()
                .map_err(|_| format!("Invalid order id '{}': order ids must be numeric", id))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if ids.is_empty() {
        return Err("At least one order id is required".to_string());
    }
    Ok(ids)
}

fn order_ids_param(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == "orderIds")
        .map(|(_, value)| value.into_owned())
}

/// `GET /api/invoices/download?orderIds=...`
pub async fn download(State(state): State<AppState>, req: Request<Body>) -> Response {
    match fetch(&state, req).await {
        Ok(resp) | Err(resp) => resp.into_response(),
    }
}

/// `GET /invoices/download?orderIds=...` for direct browser navigation.
pub async fn download_page(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();
    let headers = req.headers().clone();

    let mut resp = match fetch(&state, req).await {
        Ok(resp) => resp,
        Err(resp) => {
            let error = resp
                .error
                .unwrap_or_else(|| ApiError::new(resp.status, "Invoice download failed", &path));
            return response::error_for(&path, &headers, error);
        }
    };

    if let Some(error) = resp.error.take() {
        return response::error_for(&path, &headers, error);
    }
    if resp.status.is_success() {
        resp.headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
        resp.headers.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"invoice.pdf\""),
        );
    }
    resp.into_response()
}

/// Validate, then relay. `Err` carries a gateway-made rejection.
async fn fetch(state: &AppState, req: Request<Body>) -> Result<ProxyResponse, ProxyResponse> {
    let path = req.uri().path().to_string();
    let raw = order_ids_param(req.uri().query()).unwrap_or_default();

    let ids = parse_order_ids(&raw).map_err(|message| {
        tracing::debug!(path = %path, order_ids = %raw, "Rejected invoice request");
        ProxyResponse::api_error(ApiError::new(StatusCode::BAD_REQUEST, message, &path))
    })?;

    let inbound = InboundRequest::from_request(req, state.max_body_bytes())
        .await
        .map_err(|e| {
            ProxyResponse::api_error(ApiError::new(StatusCode::BAD_REQUEST, e.to_string(), &path))
        })?;

    let joined = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
    let inbound = inbound
        .with_path(BACKEND_PATH)
        .with_query(Some(format!("orderIds={}", joined)));

    Ok(state.relay.forward(&inbound, &RelayOptions::binary()).await)
}
