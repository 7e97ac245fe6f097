use async_trait::async_trait;

use crate::core::error::Error;
use crate::types::oauth::{AccessToken, AuthorizationCode, OAuthClient, RefreshToken};

/// Persistence callbacks behind the MCP OAuth provider.
///
/// Codes and tokens are addressed by their randomly generated value; expiry is
/// stored as epoch seconds and checked by the caller, never by the store.
#[async_trait]
pub(crate) trait OAuthStore: Send + Sync {
    async fn save_client(&self, client: &OAuthClient) -> Result<(), Error>;

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>, Error>;

    async fn save_code(&self, code: &AuthorizationCode) -> Result<(), Error>;

    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>, Error>;

    /// Returns whether a row was removed.
    async fn delete_code(&self, code: &str) -> Result<bool, Error>;

    async fn save_tokens(&self, access: &AccessToken, refresh: &RefreshToken) -> Result<(), Error>;

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>, Error>;

    async fn get_refresh_token(&self, refresh_token: &str) -> Result<Option<RefreshToken>, Error>;

    /// Removes the refresh token together with the access token it was issued with.
    async fn revoke_refresh_token(&self, refresh: &RefreshToken) -> Result<(), Error>;
}
