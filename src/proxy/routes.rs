//! Browser-facing `/api/**` entry points.
//!
//! Well-known resources get their own routes; anything else under `/api`
//! falls through to the catch-all. All of them end in `relay_api`.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Router,
};

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::proxy::invoice;
use crate::proxy::relay::{InboundRequest, ProxyResponse, RelayOptions};

/// Backend resources with dedicated entry points.
pub const RESOURCES: [&str; 5] = ["customer", "product", "supplier", "category", "order"];

/// Routes for everything under `/api`.
pub fn api_routes() -> Router<AppState> {
    let mut router = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(forward_api))
        .route("/api/invoices/download", get(invoice::download));

    for resource in RESOURCES {
        router = router
            .route(&format!("/api/{}/all", resource), get(forward_api).fallback(forward_api))
            .route(&format!("/api/{}/create", resource), post(forward_api).fallback(forward_api))
            .route(&format!("/api/{}/{{id}}", resource), relay_methods());
    }

    router.route("/api/{*rest}", relay_methods())
}

fn relay_methods() -> MethodRouter<AppState> {
    get(forward_api)
        .post(forward_api)
        .put(forward_api)
        .delete(forward_api)
}

/// Relay any API call as JSON with cookie forwarding.
pub async fn forward_api(State(state): State<AppState>, req: Request<Body>) -> Response {
    relay_api(&state, req, RelayOptions::json()).await
}

/// Login is always sent as JSON so the backend's token cookie comes back.
pub async fn login(State(state): State<AppState>, req: Request<Body>) -> Response {
    relay_api(&state, req, RelayOptions::login()).await
}

/// Read the call, strip `/api`, forward.
pub async fn relay_api(state: &AppState, req: Request<Body>, options: RelayOptions) -> Response {
    let path = req.uri().path().to_string();
    let inbound = match InboundRequest::from_request(req, state.max_body_bytes()).await {
        Ok(inbound) => inbound,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Rejected unreadable request body");
            return ProxyResponse::api_error(ApiError::new(StatusCode::BAD_REQUEST, e.to_string(), path))
                .into_response();
        }
    };

    let relative = api_relative(&path).to_string();
    state
        .relay
        .forward(&inbound.with_path(relative), &options)
        .await
        .into_response()
}

/// `/api/order/all` → `/order/all`. Paths outside `/api` are left alone.
pub fn api_relative(path: &str) -> &str {
    match path.strip_prefix("/api") {
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}
