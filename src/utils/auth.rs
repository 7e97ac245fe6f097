use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, header};
use axum::middleware::Next;
use axum::response::Response;
use tower_cookies::cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::user::SessionUser;
use crate::utils::encode::{base64url, decode_base64url};
use crate::utils::jwt::{JwtCodec, SESSION_TTL_DAYS};

pub(crate) const SESSION_COOKIE: &str = "session";
pub(crate) const STATE_COOKIE: &str = "github_oauth_state";
pub(crate) const VERIFIER_COOKIE: &str = "github_code_verifier";

const FLOW_COOKIE_MINUTES: i64 = 5;

/// The bearer credential presented on an MCP route, if any.
#[derive(Clone, Debug, Default)]
pub(crate) struct BearerToken(pub(crate) Option<String>);

pub(crate) fn session_from_cookies(
    cookies: &Cookies,
    jwt: Option<&JwtCodec>,
) -> Result<SessionUser, Error> {
    let token = cookies.get(SESSION_COOKIE).ok_or(Error::NonAuthenticated)?;
    let jwt = jwt.ok_or(Error::NonAuthenticated)?;

    jwt.verify_session(token.value())
}

pub(crate) fn set_session(cookies: &Cookies, token: String) {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(time::Duration::days(SESSION_TTL_DAYS));
    cookies.add(cookie);
}

/// Stores the login `state` and PKCE verifier for the callback. The state may
/// be an arbitrary return URL, so it is base64url-encoded to stay cookie-safe.
pub(crate) fn set_flow_cookies(cookies: &Cookies, state: &str, verifier: &str) {
    for (name, value) in [(STATE_COOKIE, base64url(state)), (VERIFIER_COOKIE, verifier.to_string())] {
        let mut cookie = Cookie::new(name, value);
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_max_age(time::Duration::minutes(FLOW_COOKIE_MINUTES));
        cookies.add(cookie);
    }
}

/// Reads and clears the `(state, verifier)` cookies.
pub(crate) fn take_flow_cookies(cookies: &Cookies) -> (Option<String>, Option<String>) {
    let state = take_cookie(cookies, STATE_COOKIE)
        .and_then(|value| decode_base64url(&value))
        .and_then(|bytes| String::from_utf8(bytes).ok());
    let verifier = take_cookie(cookies, VERIFIER_COOKIE);

    (state, verifier)
}

fn take_cookie(cookies: &Cookies, name: &'static str) -> Option<String> {
    let value = cookies.get(name).map(|c| c.value().to_string());

    let mut cookie = Cookie::new(name, "");
    cookie.set_path("/");
    cookies.remove(cookie);

    value
}

pub(crate) async fn authorize(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    let user = session_from_cookies(&cookies, state.jwt.as_ref())?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

fn requires_bearer(method: &Method, path: &str) -> bool {
    (method == Method::POST && path == "/mcp") || (method == Method::GET && path == "/sse")
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    (scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty())
        .then(|| token.trim().to_string())
}

/// Bearer check for the MCP transport. Other routes pass straight through.
pub(crate) async fn require_bearer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    if !requires_bearer(request.method(), request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let token = bearer_token(request.headers());

    if let Some(token) = &token {
        if state.tokens.authenticate_bearer(token).await?.is_none() {
            return Err(Error::InvalidToken {
                resource_metadata: state.resource_metadata_url(),
            });
        }
    }

    request.extensions_mut().insert(BearerToken(token));

    Ok(next.run(request).await)
}
