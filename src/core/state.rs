use std::sync::Arc;

use sqlx::SqlitePool;

use crate::controllers::note::NoteController;
use crate::controllers::token::TokenController;
use crate::controllers::user::UserController;
use crate::core::config::Args;
use crate::core::error::{ConfigError, Error};
use crate::core::github::GithubClient;
use crate::mcp::{McpServer, SseSessions};
use crate::token::SqliteOAuthStore;
use crate::utils::jwt::JwtCodec;

#[derive(Clone, Debug)]
pub struct AppState {
    pub(crate) jwt: Option<JwtCodec>,
    pub(crate) base_url: Option<String>,
    pub(crate) github: GithubClient,
    pub(crate) users: UserController,
    pub(crate) notes: NoteController,
    pub(crate) tokens: TokenController<SqliteOAuthStore>,
    pub(crate) mcp: Arc<McpServer>,
    pub(crate) sse: SseSessions,
}

impl AppState {
    pub fn new(pool: SqlitePool, args: &Args) -> Result<Self, ConfigError> {
        let jwt = args.jwt_secret.as_deref().map(JwtCodec::new);
        let base_url = args
            .redirect_base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string());

        let notes = NoteController::new(pool.clone());

        Ok(Self {
            github: GithubClient::new(args)?,
            users: UserController::new(pool.clone()),
            tokens: TokenController::new(
                SqliteOAuthStore::new(pool),
                jwt.clone(),
                base_url.clone(),
            ),
            mcp: Arc::new(McpServer::new(notes.clone(), jwt.clone())),
            sse: SseSessions::default(),
            notes,
            jwt,
            base_url,
        })
    }

    pub(crate) fn base_url(&self) -> Result<&str, Error> {
        self.base_url
            .as_deref()
            .ok_or(Error::ConfigurationMissing("REDIRECT_BASE_URL"))
    }

    /// Where MCP clients discover how to obtain a bearer token.
    pub(crate) fn resource_metadata_url(&self) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/.well-known/oauth-protected-resource", base))
    }
}
