use axum::extract::{Query, State};
use tower_cookies::Cookies;
use tracing::instrument;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::request::{CallbackParams, LoginParams};
use crate::types::response::Found;
use crate::types::user::SessionUser;
use crate::utils::auth::{set_flow_cookies, set_session, take_flow_cookies};
use crate::utils::encode::random_token;
use crate::utils::jwt::JwtCodec;
use crate::utils::pkce;

const DEFAULT_LANDING: &str = "/notes";

#[instrument(skip(state, cookies))]
pub(crate) async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<LoginParams>,
) -> Result<Found, Error> {
    let redirect_uri = format!("{}/auth/github/callback", state.base_url()?);

    let oauth_state = params.return_to.unwrap_or_else(|| random_token(16));
    let verifier = pkce::generate_code_verifier();
    let challenge = pkce::generate_code_challenge(&verifier);

    let location = state
        .github
        .authorize_url(&redirect_uri, &oauth_state, &challenge)?;

    set_flow_cookies(&cookies, &oauth_state, &verifier);

    Ok(Found::to(location))
}

#[instrument(skip_all)]
pub(crate) async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<CallbackParams>,
) -> Result<Found, Error> {
    let (stored_state, verifier) = take_flow_cookies(&cookies);

    let oauth_state = match (params.state, stored_state) {
        (Some(returned), Some(stored)) if returned == stored => returned,
        _ => return Err(Error::CsrfStateMismatch),
    };

    let code = params.code.ok_or(Error::MissingCode)?;
    let verifier = verifier.ok_or(Error::MissingVerifier)?;

    state.github.ensure_configured()?;
    let jwt = state
        .jwt
        .as_ref()
        .ok_or(Error::ConfigurationMissing("JWT_SECRET"))?;

    let session_token = match sign_in(&state, jwt, &code, &verifier).await {
        Ok(token) => token,
        Err(Error::NoAccessToken) => return Err(Error::NoAccessToken),
        Err(e) => {
            tracing::error!("GitHub OAuth error: {:?}", e);
            return Err(Error::AuthenticationFailed);
        }
    };

    set_session(&cookies, session_token);

    Ok(Found::to(post_login_redirect(
        &oauth_state,
        state.base_url.as_deref(),
    )))
}

async fn sign_in(
    state: &AppState,
    jwt: &JwtCodec,
    code: &str,
    verifier: &str,
) -> Result<String, Error> {
    let access_token = state
        .github
        .exchange_code(code, verifier)
        .await?
        .ok_or(Error::NoAccessToken)?;

    let github_user = state.github.fetch_user(&access_token).await?;
    let user = state.users.upsert_github_user(&github_user).await?;

    jwt.sign_session(&SessionUser {
        user_id: user.id,
        username: user.username,
    })
}

/// The login `state` is honoured as a return URL only when it shares the
/// configured base URL's origin.
pub(crate) fn post_login_redirect(oauth_state: &str, base_url: Option<&str>) -> String {
    let target = url::Url::parse(oauth_state).ok();
    let base = base_url.and_then(|base| url::Url::parse(base).ok());

    match (target, base) {
        (Some(target), Some(base)) if target.origin() == base.origin() => oauth_state.to_string(),
        _ => DEFAULT_LANDING.to_string(),
    }
}
