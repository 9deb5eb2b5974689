//! Session cookie gate.
//!
//! Runs before every request. Public paths pass untouched; everything else
//! needs a non-blank token cookie or is redirected to the login page with
//! the original URL preserved.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::sync::Arc;
use url::form_urlencoded;

use crate::auth::cookies;
use crate::config::AuthConfig;
use crate::observability::metrics;

/// Opaque credential from the token cookie. Carried, never interpreted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(***)")
    }
}

/// Outcome of gating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Public path; cookies were not inspected.
    Public,
    /// Authenticated; the token travels with the request.
    Allow(AuthToken),
    /// No usable token; send the browser here.
    Redirect(String),
}

/// Allow-list and cookie settings for the gate.
#[derive(Debug, Clone)]
pub struct AuthGate {
    cookie_name: String,
    login_path: String,
    post_login_path: String,
    public_paths: Vec<String>,
    public_prefixes: Vec<String>,
}

impl AuthGate {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            cookie_name: config.cookie_name.clone(),
            login_path: config.login_path.clone(),
            post_login_path: config.post_login_path.clone(),
            public_paths: config.public_paths.clone(),
            public_prefixes: config.public_prefixes.clone(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn post_login_path(&self) -> &str {
        &self.post_login_path
    }

    /// True when `path` bypasses the gate.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
            || self.public_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// Decide a request from its URI and headers. Single pass, no side effects.
    pub fn evaluate(&self, uri: &Uri, headers: &HeaderMap) -> GateDecision {
        if self.is_public(uri.path()) {
            return GateDecision::Public;
        }

        match cookies::bearer_token(headers, &self.cookie_name) {
            Some(token) => GateDecision::Allow(AuthToken::new(token)),
            None => GateDecision::Redirect(self.login_redirect(&original_url(uri, headers))),
        }
    }

    /// `<login>?redirect=<url-encoded original>`.
    pub fn login_redirect(&self, original: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(original.as_bytes()).collect();
        format!("{}?redirect={}", self.login_path, encoded)
    }
}

/// Absolute URL the browser asked for, including the query string.
///
/// Falls back to path + query when the request carries no `Host`.
pub fn original_url(uri: &Uri, headers: &HeaderMap) -> String {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());

    let host = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        });

    match host {
        Some(host) => {
            let scheme = uri
                .scheme_str()
                .or_else(|| {
                    headers
                        .get("x-forwarded-proto")
                        .and_then(|v| v.to_str().ok())
                })
                .unwrap_or("http");
            format!("{}://{}{}", scheme, host, path_and_query)
        }
        None => path_and_query.to_string(),
    }
}

/// Redirect that short-circuits a gated request.
pub fn redirect_to(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Middleware wrapping every route of the gateway.
pub async fn auth_gate_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match gate.evaluate(req.uri(), req.headers()) {
        GateDecision::Public => next.run(req).await,
        GateDecision::Allow(token) => {
            req.extensions_mut().insert(token);
            next.run(req).await
        }
        GateDecision::Redirect(location) => {
            tracing::debug!(path = %req.uri().path(), "No session token, redirecting to login");
            metrics::record_auth_redirect();
            redirect_to(&location)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate() -> AuthGate {
        AuthGate::from_config(&AuthConfig::default())
    }

    fn headers(host: Option<&'static str>, cookie: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(host) = host {
            headers.insert(header::HOST, HeaderValue::from_static(host));
        }
        if let Some(cookie) = cookie {
            headers.insert(header::COOKIE, HeaderValue::from_static(cookie));
        }
        headers
    }

    #[test]
    fn allow_list_passes_without_cookies() {
        let gate = gate();
        for path in [
            "/login",
            "/api/auth/login",
            "/api/auth/logout",
            "/css/site.css",
            "/js/app.js",
            "/images/logo.png",
            "/static/x",
            "/webjars/bootstrap.css",
            "/favicon.ico",
            "/error",
        ] {
            let uri: Uri = path.parse().unwrap();
            assert_eq!(gate.evaluate(&uri, &HeaderMap::new()), GateDecision::Public, "{}", path);
        }
    }

    #[test]
    fn allow_list_is_not_a_loose_prefix_match() {
        let gate = gate();
        assert!(!gate.is_public("/login-help"));
        assert!(!gate.is_public("/api/authx"));
        assert!(!gate.is_public("/errors"));
    }

    #[test]
    fn missing_token_redirects_with_encoded_original_url() {
        let uri: Uri = "/orders/list?page=2&sort=date desc".replace(' ', "%20").parse().unwrap();
        let decision = gate().evaluate(&uri, &headers(Some("ui.local:8081"), Some("theme=dark")));
        assert_eq!(
            decision,
            GateDecision::Redirect(
                "/login?redirect=http%3A%2F%2Fui.local%3A8081%2Forders%2Flist%3Fpage%3D2%26sort%3Ddate%2520desc"
                    .to_string()
            )
        );
    }

    #[test]
    fn blank_token_redirects() {
        let uri: Uri = "/dashboard".parse().unwrap();
        let decision = gate().evaluate(&uri, &headers(None, Some("token=   ")));
        assert_eq!(decision, GateDecision::Redirect("/login?redirect=%2Fdashboard".to_string()));
    }

    #[test]
    fn token_allows_and_is_carried() {
        let uri: Uri = "/api/customer/all".parse().unwrap();
        match gate().evaluate(&uri, &headers(Some("ui"), Some("a=1; token=jwt"))) {
            GateDecision::Allow(token) => assert_eq!(token.as_str(), "jwt"),
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn forwarded_proto_is_honoured() {
        let uri: Uri = "/chat".parse().unwrap();
        let mut h = headers(Some("ui.example.com"), None);
        h.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(original_url(&uri, &h), "https://ui.example.com/chat");
    }

    #[test]
    fn token_debug_is_redacted() {
        assert_eq!(format!("{:?}", AuthToken("secret".into())), "AuthToken(***)");
    }
}
