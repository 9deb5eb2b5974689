//! Cookie and authorization propagation.
//!
//! Every place that forwards auth upstream goes through these helpers so the
//! backend sees the same credentials no matter which relay carried the call.

use axum::http::{header, HeaderMap, HeaderValue};
use axum_extra::extract::cookie::{Cookie, CookieJar};

/// The inbound `Cookie` header, verbatim, for forwarding.
///
/// HTTP/2 clients may split cookies over several header fields; those are
/// rejoined with `"; "` in their original order.
pub fn forward_cookie_header(headers: &HeaderMap) -> Option<HeaderValue> {
    let mut values = headers.get_all(header::COOKIE).iter();
    let first = values.next()?;
    let rest: Vec<&HeaderValue> = values.collect();
    if rest.is_empty() {
        return Some(first.clone());
    }

    let mut joined = first.as_bytes().to_vec();
    for value in rest {
        joined.extend_from_slice(b"; ");
        joined.extend_from_slice(value.as_bytes());
    }
    HeaderValue::from_bytes(&joined).ok()
}

/// Value of the cookie named `name`, surrounding quotes removed.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(name)
        .map(|cookie| cookie.value_trimmed().to_string())
}

/// The auth token from the named cookie. Blank values count as absent.
pub fn bearer_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    cookie_value(headers, cookie_name).filter(|token| !token.trim().is_empty())
}

/// `Authorization: Bearer <token>` for a token.
pub fn bearer_authorization(token: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {}", token)).ok()
}

/// Append every `Set-Cookie` of `from` onto `to`, in order.
///
/// Returns how many were copied. Attributes are untouched.
pub fn copy_set_cookies(from: &HeaderMap, to: &mut HeaderMap) -> usize {
    let mut copied = 0;
    for value in from.get_all(header::SET_COOKIE) {
        to.append(header::SET_COOKIE, value.clone());
        copied += 1;
    }
    copied
}

/// A cookie that makes the browser drop `name` immediately.
pub fn expired_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .http_only(true)
        .build()
}

/// Credentials to attach to an upstream call.
#[derive(Debug, Clone, Default)]
pub struct ForwardedAuth {
    pub cookie: Option<HeaderValue>,
    pub authorization: Option<HeaderValue>,
}

impl ForwardedAuth {
    /// Cookie header only.
    pub fn cookies(headers: &HeaderMap) -> Self {
        Self {
            cookie: forward_cookie_header(headers),
            authorization: None,
        }
    }

    /// Cookie header plus `Authorization`: the inbound one if present,
    /// otherwise a bearer synthesized from the token cookie.
    pub fn cookies_and_bearer(headers: &HeaderMap, cookie_name: &str) -> Self {
        Self::cookies_with_bearer(headers, bearer_token(headers, cookie_name).as_deref())
    }

    /// Cookie header plus `Authorization`: the inbound one if present,
    /// otherwise `Bearer <token>` for an already extracted token.
    pub fn cookies_with_bearer(headers: &HeaderMap, token: Option<&str>) -> Self {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .cloned()
            .or_else(|| token.and_then(bearer_authorization));
        Self {
            cookie: forward_cookie_header(headers),
            authorization,
        }
    }

    /// Write these credentials onto an outbound header map.
    pub fn apply(&self, headers: &mut HeaderMap) {
        if let Some(cookie) = &self.cookie {
            headers.insert(header::COOKIE, cookie.clone());
        }
        if let Some(authorization) = &self.authorization {
            headers.insert(header::AUTHORIZATION, authorization.clone());
        }
    }
}
