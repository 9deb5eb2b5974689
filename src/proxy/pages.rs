//! Page requests that no gateway route claims.
//!
//! Relayed to the view-rendering tier when one is configured. Failures render
//! the generic error view, or JSON for AJAX callers.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};

use crate::http::response::{self, ApiError};
use crate::http::server::AppState;
use crate::proxy::relay::{InboundRequest, RelayOptions};

/// Router fallback.
pub async fn page_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    relay_page(&state, req).await
}

pub async fn relay_page(state: &AppState, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();
    let headers = req.headers().clone();

    let Some(pages) = state.pages.as_ref() else {
        return response::error_for(
            &path,
            &headers,
            ApiError::new(StatusCode::NOT_FOUND, "The requested page does not exist", &path),
        );
    };

    let inbound = match InboundRequest::from_request(req, state.max_body_bytes()).await {
        Ok(inbound) => inbound,
        Err(e) => {
            return response::error_for(
                &path,
                &headers,
                ApiError::new(StatusCode::BAD_REQUEST, e.to_string(), &path),
            )
        }
    };

    let resp = pages.forward(&inbound, &RelayOptions::page()).await;
    if resp.is_synthesized() {
        return response::error_for(
            &path,
            &headers,
            ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "The page could not be loaded. Please try again later.",
                &path,
            ),
        );
    }
    resp.into_response()
}
