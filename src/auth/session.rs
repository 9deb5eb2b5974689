//! Login page and logout.
//!
//! Tokens are issued by the backend; these handlers only look at the cookie
//! or clear it.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::auth::{cookies, gate};
use crate::http::server::AppState;
use crate::proxy::pages;

/// `GET /login`: signed-in users go straight to the landing page.
pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request<Body>,
) -> Response {
    let signed_in = jar
        .get(state.gate.cookie_name())
        .is_some_and(|cookie| !cookie.value_trimmed().trim().is_empty());
    if signed_in {
        return gate::redirect_to(state.gate.post_login_path());
    }
    pages::relay_page(&state, req).await
}

/// `POST /logout`: expire the token cookie and go back to the login page.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let jar = jar.add(cookies::expired_cookie(state.gate.cookie_name()));
    tracing::debug!("Session cookie cleared");
    (
        jar,
        gate::redirect_to(&format!("{}?logout=true", state.gate.login_path())),
    )
}
