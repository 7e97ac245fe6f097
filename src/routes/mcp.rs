use axum::body::Bytes;
use axum::extract::{Extension, Json, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use tracing::instrument;

use crate::core::error::Error;
use crate::core::state::AppState;
use crate::mcp::McpContext;
use crate::types::request::MessageParams;
use crate::utils::auth::BearerToken;

#[instrument(skip_all)]
pub(crate) async fn post(
    State(state): State<AppState>,
    Extension(BearerToken(token)): Extension<BearerToken>,
    body: Bytes,
) -> Response {
    let ctx = McpContext { token };

    match state.mcp.handle_message(&body, &ctx).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

#[instrument(skip_all)]
pub(crate) async fn sse(
    State(state): State<AppState>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Result<impl IntoResponse, Error> {
    let (_, stream) = state.sse.open(token).await?;

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Messages for an SSE session. The token the stream was opened with is
/// checked against storage on every message, so a rotated or expired token
/// ends the session.
#[instrument(skip(state, body))]
pub(crate) async fn message(
    State(state): State<AppState>,
    Query(params): Query<MessageParams>,
    body: Bytes,
) -> Result<StatusCode, Error> {
    let token = state.sse.token(&params.session_id).await?;

    if let Some(token) = &token {
        if state.tokens.authenticate_bearer(token).await?.is_none() {
            state.sse.close(&params.session_id).await;
            return Err(Error::InvalidToken {
                resource_metadata: state.resource_metadata_url(),
            });
        }
    }

    let ctx = McpContext { token };

    if let Some(response) = state.mcp.handle_message(&body, &ctx).await {
        state.sse.send(&params.session_id, &response).await?;
    }

    Ok(StatusCode::ACCEPTED)
}
