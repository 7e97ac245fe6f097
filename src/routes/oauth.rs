use axum::extract::{Form, Json, Query, RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tower_cookies::Cookies;
use tracing::instrument;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::types::oauth::{
    AuthorizeParams, ClientCredentials, ClientMetadata, OAuthErrorKind, TokenRequest,
    TokenResponse,
};
use crate::types::response::Found;
use crate::utils::auth::session_from_cookies;
use crate::utils::pkce;

#[instrument(skip(state))]
pub(crate) async fn authorization_server_metadata(
    State(state): State<AppState>,
) -> Result<Json<Value>, Error> {
    let base = state.base_url()?;

    Ok(Json(json!({
        "issuer": base,
        "authorization_endpoint": format!("{}/authorize", base),
        "token_endpoint": format!("{}/token", base),
        "registration_endpoint": format!("{}/register", base),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "code_challenge_methods_supported": [pkce::S256],
        "token_endpoint_auth_methods_supported": [
            "none",
            "client_secret_post",
            "client_secret_basic",
        ],
    })))
}

#[instrument(skip(state))]
pub(crate) async fn protected_resource_metadata(
    State(state): State<AppState>,
) -> Result<Json<Value>, Error> {
    let base = state.base_url()?;

    Ok(Json(json!({
        "resource": format!("{}/mcp", base),
        "authorization_servers": [base],
        "bearer_methods_supported": ["header"],
    })))
}

#[instrument(skip(state, metadata))]
pub(crate) async fn register(
    State(state): State<AppState>,
    Json(metadata): Json<ClientMetadata>,
) -> Result<impl IntoResponse, Error> {
    let client = state.tokens.register_client(metadata).await?;

    Ok((StatusCode::CREATED, Json(client)))
}

#[instrument(skip(state, cookies, raw_query))]
pub(crate) async fn authorize(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(params): Query<AuthorizeParams>,
    RawQuery(raw_query): RawQuery,
) -> Result<Found, Error> {
    let request = state.tokens.validate_authorization(&params).await?;

    let session = session_from_cookies(&cookies, state.jwt.as_ref()).ok();

    let return_to = match raw_query {
        Some(query) => format!("{}/authorize?{}", state.base_url()?, query),
        None => format!("{}/authorize", state.base_url()?),
    };

    if let Some(login) = state
        .tokens
        .authorization_redirect(session.as_ref(), &return_to)?
    {
        return Ok(Found::to(login));
    }

    let Some(session) = session else {
        return Err(Error::NonAuthenticated);
    };

    Ok(Found::to(
        state.tokens.issue_code(session.user_id, &request).await?,
    ))
}

#[instrument(skip_all)]
pub(crate) async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, Error> {
    let credentials = client_credentials(&headers, &request)?;

    let response = match request.grant_type.as_str() {
        "authorization_code" => {
            let code = request.code.as_deref().ok_or(Error::OAuth(
                OAuthErrorKind::InvalidRequest,
                "code is required",
            ))?;

            state
                .tokens
                .exchange_code(
                    &credentials,
                    code,
                    request.redirect_uri.as_deref(),
                    request.code_verifier.as_deref(),
                )
                .await?
        }
        "refresh_token" => {
            let refresh_token = request.refresh_token.as_deref().ok_or(Error::OAuth(
                OAuthErrorKind::InvalidRequest,
                "refresh_token is required",
            ))?;

            state.tokens.refresh(&credentials, refresh_token).await?
        }
        _ => {
            return Err(Error::OAuth(
                OAuthErrorKind::UnsupportedGrantType,
                "Unsupported grant_type",
            ));
        }
    };

    Ok(Json(response))
}

/// HTTP Basic credentials win over `client_id`/`client_secret` form fields.
fn client_credentials(
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<ClientCredentials, Error> {
    if let Some(credentials) = basic_credentials(headers) {
        return Ok(credentials);
    }

    let client_id = request.client_id.clone().ok_or(Error::OAuth(
        OAuthErrorKind::InvalidClient,
        "Client authentication failed",
    ))?;

    Ok(ClientCredentials {
        client_id,
        client_secret: request.client_secret.clone(),
    })
}

fn basic_credentials(headers: &HeaderMap) -> Option<ClientCredentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;

    Some(ClientCredentials {
        client_id: client_id.to_string(),
        client_secret: Some(client_secret.to_string()).filter(|secret| !secret.is_empty()),
    })
}
