use axum::Json;
use axum::http::StatusCode;
use axum::http::header::WWW_AUTHENTICATE;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::types::oauth::OAuthErrorKind;
use crate::types::response::Found;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Database migration error: {0}")]
    DatabaseMigration(#[from] sqlx::migrate::MigrateError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("Reqwest error: {0}")]
    HTTPClient(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("User not authenticated")]
    NonAuthenticated,
    #[error("Invalid session token. Please log in again.")]
    InvalidSession,
    #[error("Invalid state parameter")]
    CsrfStateMismatch,
    #[error("Authorization code not provided")]
    MissingCode,
    #[error("Code verifier not found")]
    MissingVerifier,
    #[error("Failed to get access token from GitHub")]
    NoAccessToken,
    #[error("GitHub exchange failed: {0}")]
    UpstreamExchange(#[from] reqwest::Error),
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("{0} is not configured")]
    ConfigurationMissing(&'static str),
    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("URL encoding error: {0}")]
    URLEncode(#[from] serde_urlencoded::ser::Error),
    #[error("Note not found")]
    NoteNotFound,
    #[error("Session not found")]
    SessionNotFound,
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("Invalid access token")]
    InvalidToken { resource_metadata: Option<String> },
    #[error("OAuth error: {1}")]
    OAuth(OAuthErrorKind, &'static str),
}

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::NonAuthenticated | Error::InvalidSession => StatusCode::FOUND,
            Error::CsrfStateMismatch
            | Error::MissingCode
            | Error::MissingVerifier
            | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NoAccessToken | Error::InvalidToken { .. } => StatusCode::UNAUTHORIZED,
            Error::NoteNotFound | Error::SessionNotFound => StatusCode::NOT_FOUND,
            Error::OAuth(kind, _) => kind.status(),
            Error::UpstreamExchange(_)
            | Error::AuthenticationFailed
            | Error::ConfigurationMissing(_)
            | Error::Sql(_)
            | Error::Jwt(_)
            | Error::Serialize(_)
            | Error::URLEncode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("{:?}", self);
        } else {
            tracing::debug!("{:?}", self);
        }

        match self {
            Error::NonAuthenticated | Error::InvalidSession => Found::to("/").into_response(),
            Error::OAuth(kind, description) => (
                status,
                Json(json!({ "error": kind.code(), "error_description": description })),
            )
                .into_response(),
            Error::InvalidToken { resource_metadata } => {
                let challenge = match resource_metadata {
                    Some(url) => format!(
                        r#"Bearer error="invalid_token", resource_metadata="{}""#,
                        url
                    ),
                    None => r#"Bearer error="invalid_token""#.to_string(),
                };

                (
                    status,
                    [(WWW_AUTHENTICATE, challenge)],
                    Json(json!({ "error": "invalid_token" })),
                )
                    .into_response()
            }
            Error::CsrfStateMismatch => (status, "Invalid state parameter").into_response(),
            Error::MissingCode => (status, "Authorization code not provided").into_response(),
            Error::MissingVerifier => (status, "Code verifier not found").into_response(),
            Error::BadRequest(message) => (status, Json(json!({ "error": message }))).into_response(),
            Error::NoAccessToken => {
                (status, "Failed to get access token from GitHub").into_response()
            }
            Error::NoteNotFound => (status, "Note not found").into_response(),
            Error::SessionNotFound => (status, "Session not found").into_response(),
            Error::UpstreamExchange(_) | Error::AuthenticationFailed => {
                (status, "Authentication failed").into_response()
            }
            Error::ConfigurationMissing(_) => {
                (status, "Server is not properly configured").into_response()
            }
            Error::Sql(_) => (status, "SQL error").into_response(),
            Error::Jwt(_) => (status, "JWT error").into_response(),
            Error::Serialize(_) => (status, "Serialization error").into_response(),
            Error::URLEncode(_) => (status, "URL encoding error").into_response(),
        }
    }
}
