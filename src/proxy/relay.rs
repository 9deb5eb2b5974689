//! Backend forwarding.
//!
//! # Responsibilities
//! - Map an inbound call to one outbound call on a leased backend client
//! - Copy status and body back unchanged, republish `Set-Cookie`
//! - Turn transport failures into a 500 `{"error": "..."}` envelope

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::auth::cookies::{self, ForwardedAuth};
use crate::auth::AuthToken;
use crate::error::error_chain;
use crate::http::request::{self, X_REQUEST_ID};
use crate::http::response::{self, ApiError};
use crate::observability::metrics;
use crate::pool::{BackendClient, ConnectionPool, PoolError};

/// Failures between the gateway and the backend.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    Transport(String),

    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// One browser call, body fully read.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Backend-relative path (`/api` already stripped for API calls).
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Token the auth gate accepted for this request, if it was gated.
    pub token: Option<AuthToken>,
}

impl InboundRequest {
    /// Read a request, buffering at most `limit` body bytes.
    pub async fn from_request(req: Request<Body>, limit: usize) -> Result<Self, RelayError> {
        let (parts, body) = req.into_parts();
        let body = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| RelayError::Body(e.to_string()))?;

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            token: parts.extensions.get::<AuthToken>().cloned(),
            headers: parts.headers,
            body,
        })
    }

    /// Same request addressed to another path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Same request with another query string.
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }
}

/// Fully resolved call to the backend.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Which credentials travel upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthForwarding {
    /// The full `Cookie` header.
    Cookies,
    /// `Cookie` plus `Authorization` (inbound, or `Bearer <token>` from the cookie).
    CookiesAndBearer,
}

/// Which backend response headers reach the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPolicy {
    /// `Content-Type: application/json` and the backend's `Set-Cookie` only.
    Json,
    /// Everything except hop-by-hop headers. Used for binary downloads and pages.
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    pub auth: AuthForwarding,
    pub headers: HeaderPolicy,
    /// Send `Content-Type: application/json` regardless of the inbound header.
    pub force_json: bool,
}

impl RelayOptions {
    pub const fn json() -> Self {
        Self {
            auth: AuthForwarding::Cookies,
            headers: HeaderPolicy::Json,
            force_json: false,
        }
    }

    pub const fn login() -> Self {
        Self {
            force_json: true,
            ..Self::json()
        }
    }

    pub const fn binary() -> Self {
        Self {
            auth: AuthForwarding::CookiesAndBearer,
            headers: HeaderPolicy::Preserve,
            force_json: false,
        }
    }

    pub const fn page() -> Self {
        Self {
            auth: AuthForwarding::Cookies,
            headers: HeaderPolicy::Preserve,
            force_json: false,
        }
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self::json()
    }
}

/// What the browser gets back.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Set when the gateway produced this response itself.
    pub error: Option<ApiError>,
}

/// Connection-scoped headers plus `content-length`, which is recomputed.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

impl ProxyResponse {
    /// Wrap a backend answer. Status and body are never altered.
    pub fn from_backend(status: StatusCode, backend: &HeaderMap, body: Bytes, policy: HeaderPolicy) -> Self {
        let mut headers = HeaderMap::new();
        match policy {
            HeaderPolicy::Json => {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                cookies::copy_set_cookies(backend, &mut headers);
            }
            HeaderPolicy::Preserve => {
                for (name, value) in backend {
                    if is_hop_by_hop(name) {
                        continue;
                    }
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        Self {
            status,
            headers,
            body,
            error: None,
        }
    }

    /// 500 with `{"error": message}`.
    pub fn transport_failure(message: &str, path: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers,
            body: Bytes::from(response::transport_failure_body(message)),
            error: Some(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message, path)),
        }
    }

    /// Structured error answered by the gateway, e.g. a rejected parameter.
    pub fn api_error(error: ApiError) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = serde_json::to_vec(&error).unwrap_or_default();
        Self {
            status: error.status_code(),
            headers,
            body: Bytes::from(body),
            error: Some(error),
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.error.is_some()
    }
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Forwarder bound to one upstream base URL and path prefix.
pub struct BackendRelay {
    kind: &'static str,
    base_url: String,
    prefix: String,
    cookie_name: String,
    pool: Arc<ConnectionPool<BackendClient>>,
    request_timeout: Option<Duration>,
}

impl BackendRelay {
    /// `kind` labels metrics and logs ("backend", "pages").
    pub fn new(
        kind: &'static str,
        base_url: &str,
        prefix: &str,
        cookie_name: &str,
        pool: Arc<ConnectionPool<BackendClient>>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix: prefix.trim_end_matches('/').to_string(),
            cookie_name: cookie_name.to_string(),
            pool,
            request_timeout,
        }
    }

    /// Resolve the outbound call: `<base><prefix><path>[?query]`.
    pub fn build_outbound(
        &self,
        inbound: &InboundRequest,
        options: &RelayOptions,
    ) -> Result<OutboundRequest, RelayError> {
        let mut target = format!("{}{}{}", self.base_url, self.prefix, inbound.path);
        if let Some(query) = inbound.query.as_deref().filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        let uri: Uri = target
            .parse()
            .map_err(|e| RelayError::InvalidRequest(format!("{}: {}", target, e)))?;

        let mut headers = HeaderMap::new();
        if options.force_json {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        } else if let Some(content_type) = inbound.headers.get(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, content_type.clone());
        }
        if let Some(accept) = inbound.headers.get(header::ACCEPT) {
            headers.insert(header::ACCEPT, accept.clone());
        }

        let auth = match options.auth {
            AuthForwarding::Cookies => ForwardedAuth::cookies(&inbound.headers),
            AuthForwarding::CookiesAndBearer => match &inbound.token {
                Some(token) => ForwardedAuth::cookies_with_bearer(&inbound.headers, Some(token.as_str())),
                None => ForwardedAuth::cookies_and_bearer(&inbound.headers, &self.cookie_name),
            },
        };
        auth.apply(&mut headers);

        if let Some(id) = request::request_id(&inbound.headers) {
            headers.insert(X_REQUEST_ID, id.clone());
        }

        Ok(OutboundRequest {
            method: inbound.method.clone(),
            uri,
            headers,
            body: inbound.body.clone(),
        })
    }

    /// Issue one call and read the whole answer.
    pub async fn execute(
        &self,
        outbound: OutboundRequest,
    ) -> Result<(StatusCode, HeaderMap, Bytes), RelayError> {
        let lease = self.pool.acquire().await?;

        let mut builder = Request::builder().method(outbound.method).uri(outbound.uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(outbound.headers);
        }
        let request = builder
            .body(Body::from(outbound.body))
            .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

        let call = async move {
            let response: hyper::Response<hyper::body::Incoming> = lease
                .request(request)
                .await
                .map_err(|e| RelayError::Transport(error_chain(&e)))?;
            let (parts, body) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), usize::MAX)
                .await
                .map_err(|e| RelayError::Transport(error_chain(&e)))?;
            Ok((parts.status, parts.headers, body))
        };

        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RelayError::Timeout(limit))?,
            None => call.await,
        }
    }

    /// Forward and always produce a response.
    pub async fn forward(&self, inbound: &InboundRequest, options: &RelayOptions) -> ProxyResponse {
        let start = Instant::now();
        let request_id = request::request_id_str(&inbound.headers);

        tracing::debug!(
            request_id = %request_id,
            kind = self.kind,
            method = %inbound.method,
            path = %inbound.path,
            "Relaying request"
        );

        let result = match self.build_outbound(inbound, options) {
            Ok(outbound) => self.execute(outbound).await,
            Err(e) => Err(e),
        };

        let response = match result {
            Ok((status, headers, body)) => {
                ProxyResponse::from_backend(status, &headers, body, options.headers)
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    kind = self.kind,
                    path = %inbound.path,
                    error = %e,
                    "Relay failed"
                );
                ProxyResponse::transport_failure(&e.to_string(), &inbound.path)
            }
        };

        metrics::record_request(self.kind, inbound.method.as_str(), response.status.as_u16(), start);
        response
    }
}

impl std::fmt::Debug for BackendRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRelay")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::pool::backend_client;

    fn relay(prefix: &str) -> BackendRelay {
        let pool = ConnectionPool::new("backend", PoolConfig::default(), backend_client).unwrap();
        BackendRelay::new("backend", "http://backend:8080/", prefix, "token", Arc::new(pool), None)
    }

    fn inbound(method: Method, path: &str, query: Option<&str>) -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("JSESSIONID=s1; token=jwt"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("req-1"));
        InboundRequest {
            method,
            path: path.to_string(),
            query: query.map(str::to_string),
            headers,
            body: Bytes::from_static(b"{}"),
            token: None,
        }
    }

    #[tokio::test]
    async fn outbound_targets_prefixed_backend_path() {
        let out = relay("/api")
            .build_outbound(&inbound(Method::GET, "/order/all", Some("page=2")), &RelayOptions::json())
            .unwrap();
        assert_eq!(out.uri, "http://backend:8080/api/order/all?page=2");
        assert_eq!(out.method, Method::GET);
        assert_eq!(out.headers[header::COOKIE], "JSESSIONID=s1; token=jwt");
        assert_eq!(out.headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(out.headers[X_REQUEST_ID], "req-1");
        assert!(out.headers.get(header::AUTHORIZATION).is_none());
        assert_eq!(out.body, Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn login_forces_json_content_type() {
        let out = relay("/api")
            .build_outbound(&inbound(Method::POST, "/auth/login", None), &RelayOptions::login())
            .unwrap();
        assert_eq!(out.headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(out.uri, "http://backend:8080/api/auth/login");
    }

    #[tokio::test]
    async fn binary_calls_carry_bearer_from_cookie() {
        let out = relay("/api")
            .build_outbound(&inbound(Method::GET, "/invoices/download", Some("orderIds=1,2")), &RelayOptions::binary())
            .unwrap();
        assert_eq!(out.headers[header::AUTHORIZATION], "Bearer jwt");
        assert_eq!(out.headers[header::COOKIE], "JSESSIONID=s1; token=jwt");
    }

    #[tokio::test]
    async fn gate_token_is_preferred_for_bearer() {
        let mut request = inbound(Method::GET, "/invoices/download", Some("orderIds=1"));
        request.token = Some(AuthToken::new("from-gate"));
        let out = relay("/api").build_outbound(&request, &RelayOptions::binary()).unwrap();
        assert_eq!(out.headers[header::AUTHORIZATION], "Bearer from-gate");
    }

    #[tokio::test]
    async fn gate_token_travels_in_extensions() {
        let mut req = Request::get("/api/invoices/download").body(Body::empty()).unwrap();
        req.extensions_mut().insert(AuthToken::new("jwt"));
        let inbound = InboundRequest::from_request(req, 1024).await.unwrap();
        assert_eq!(inbound.token, Some(AuthToken::new("jwt")));
    }

    #[tokio::test]
    async fn pages_relay_has_no_prefix() {
        let out = relay("")
            .build_outbound(&inbound(Method::GET, "/dashboard", None), &RelayOptions::page())
            .unwrap();
        assert_eq!(out.uri, "http://backend:8080/dashboard");
    }

    #[test]
    fn json_policy_keeps_only_content_type_and_cookies() {
        let mut backend = HeaderMap::new();
        backend.insert("x-internal", HeaderValue::from_static("1"));
        backend.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain;charset=UTF-8"));
        backend.append(header::SET_COOKIE, HeaderValue::from_static("token=a; Path=/; HttpOnly"));
        backend.append(header::SET_COOKIE, HeaderValue::from_static("theme=b; Max-Age=60"));

        let resp = ProxyResponse::from_backend(StatusCode::OK, &backend, Bytes::new(), HeaderPolicy::Json);
        assert_eq!(resp.headers[header::CONTENT_TYPE], "application/json");
        assert!(resp.headers.get("x-internal").is_none());
        let cookies: Vec<_> = resp.headers.get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies, ["token=a; Path=/; HttpOnly", "theme=b; Max-Age=60"]);
    }

    #[test]
    fn preserve_policy_drops_hop_by_hop_headers() {
        let mut backend = HeaderMap::new();
        backend.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
        backend.insert(
            header::CONTENT_DISPOSITION,
            HeaderValue::from_static("attachment; filename=\"invoice.pdf\""),
        );
        backend.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        backend.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        backend.insert(header::CONTENT_LENGTH, HeaderValue::from_static("4"));

        let resp = ProxyResponse::from_backend(
            StatusCode::OK,
            &backend,
            Bytes::from_static(b"%PDF"),
            HeaderPolicy::Preserve,
        );
        assert_eq!(resp.headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(resp.headers[header::CONTENT_DISPOSITION], "attachment; filename=\"invoice.pdf\"");
        assert!(resp.headers.get(header::TRANSFER_ENCODING).is_none());
        assert!(resp.headers.get(header::CONNECTION).is_none());
        assert!(resp.headers.get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn error_status_and_body_pass_through() {
        let body = Bytes::from_static(b"{\"status\":0,\"message\":\"detail from backend\"}");
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::NOT_FOUND,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            for policy in [HeaderPolicy::Json, HeaderPolicy::Preserve] {
                let resp = ProxyResponse::from_backend(status, &HeaderMap::new(), body.clone(), policy);
                assert_eq!(resp.status, status);
                assert_eq!(resp.body, body);
                assert!(!resp.is_synthesized());
            }
        }
    }

    #[test]
    fn transport_failure_is_a_500_envelope() {
        let resp = ProxyResponse::transport_failure("connection refused", "/order/all");
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        let value: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(value, serde_json::json!({ "error": "connection refused" }));
        assert!(resp.is_synthesized());
    }
}
