use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::instrument;

use crate::core::error::Error;
use crate::token::store::OAuthStore;
use crate::types::oauth::{
    AccessToken, AuthorizationCode, AuthorizationRequest, AuthorizeParams, ClientCredentials,
    ClientMetadata, OAuthClient, OAuthErrorKind, RefreshToken, TokenGrant, TokenResponse,
};
use crate::types::user::{SessionUser, TokenSubject, UserId};
use crate::utils::encode::{constant_time_eq, random_token};
use crate::utils::jwt::JwtCodec;
use crate::utils::pkce;

const CODE_TTL_MINUTES: i64 = 10;

/// Provider side of the MCP OAuth flow: registration, authorization codes,
/// and the access/refresh token lifecycle, all persisted through `S`.
pub(crate) struct TokenController<S: OAuthStore> {
    store: Arc<S>,
    jwt: Option<JwtCodec>,
    base_url: Option<String>,
}

impl<S: OAuthStore> Clone for TokenController<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            jwt: self.jwt.clone(),
            base_url: self.base_url.clone(),
        }
    }
}

impl<S: OAuthStore> std::fmt::Debug for TokenController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenController")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl<S: OAuthStore> TokenController<S> {
    pub(crate) fn new(store: S, jwt: Option<JwtCodec>, base_url: Option<String>) -> Self {
        Self {
            store: Arc::new(store),
            jwt,
            base_url,
        }
    }

    fn jwt(&self) -> Result<&JwtCodec, Error> {
        self.jwt
            .as_ref()
            .ok_or(Error::ConfigurationMissing("JWT_SECRET"))
    }

    fn base_url(&self) -> Result<&str, Error> {
        self.base_url
            .as_deref()
            .ok_or(Error::ConfigurationMissing("REDIRECT_BASE_URL"))
    }

    #[instrument(skip_all)]
    pub(crate) async fn register_client(
        &self,
        metadata: ClientMetadata,
    ) -> Result<OAuthClient, Error> {
        if metadata.redirect_uris.is_empty() {
            return Err(Error::OAuth(
                OAuthErrorKind::InvalidRedirectUri,
                "At least one redirect URI is required",
            ));
        }

        if metadata
            .redirect_uris
            .iter()
            .any(|uri| url::Url::parse(uri).is_err())
        {
            return Err(Error::OAuth(
                OAuthErrorKind::InvalidRedirectUri,
                "Redirect URIs must be absolute URLs",
            ));
        }

        let public = metadata.is_public();

        let client = OAuthClient {
            client_id: uuid::Uuid::new_v4().to_string(),
            client_secret: (!public).then(|| random_token(32)),
            client_id_issued_at: Utc::now().timestamp(),
            client_secret_expires_at: (!public).then_some(0),
            metadata,
        };

        self.store.save_client(&client).await?;

        tracing::info!(client_id = %client.client_id, public, "Registered OAuth client");

        Ok(client)
    }

    /// Checks an `/authorize` request before any login or consent happens.
    pub(crate) async fn validate_authorization(
        &self,
        params: &AuthorizeParams,
    ) -> Result<AuthorizationRequest, Error> {
        if params.response_type.as_deref() != Some("code") {
            return Err(Error::OAuth(
                OAuthErrorKind::UnsupportedResponseType,
                "Only the code response type is supported",
            ));
        }

        let client_id = params.client_id.as_deref().ok_or(Error::OAuth(
            OAuthErrorKind::InvalidRequest,
            "client_id is required",
        ))?;

        let client = self.store.get_client(client_id).await?.ok_or(Error::OAuth(
            OAuthErrorKind::InvalidClient,
            "Unknown client",
        ))?;

        let redirect_uri = match params.redirect_uri.as_deref() {
            Some(uri) if client.allows_redirect_uri(uri) => uri.to_string(),
            Some(_) => {
                return Err(Error::OAuth(
                    OAuthErrorKind::InvalidRequest,
                    "Unregistered redirect_uri",
                ));
            }
            None => match client.metadata.redirect_uris.as_slice() {
                [only] => only.clone(),
                _ => {
                    return Err(Error::OAuth(
                        OAuthErrorKind::InvalidRequest,
                        "redirect_uri is required",
                    ));
                }
            },
        };

        let code_challenge = params
            .code_challenge
            .as_deref()
            .filter(|challenge| !challenge.is_empty())
            .ok_or(Error::OAuth(
                OAuthErrorKind::InvalidRequest,
                "code_challenge is required",
            ))?;

        if params.code_challenge_method.as_deref().unwrap_or(pkce::S256) != pkce::S256 {
            return Err(Error::OAuth(
                OAuthErrorKind::InvalidRequest,
                "Only the S256 code challenge method is supported",
            ));
        }

        Ok(AuthorizationRequest {
            client_id: client.client_id,
            redirect_uri,
            code_challenge: code_challenge.to_string(),
            scopes: params
                .scope
                .as_deref()
                .map(|scope| scope.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            state: params.state.clone(),
        })
    }

    /// `None` when the caller already holds a valid session, otherwise the
    /// login URL that returns to `return_to` once signed in.
    pub(crate) fn authorization_redirect(
        &self,
        session: Option<&SessionUser>,
        return_to: &str,
    ) -> Result<Option<String>, Error> {
        if session.is_some() {
            return Ok(None);
        }

        let query = serde_urlencoded::to_string([("return_to", return_to)])?;

        Ok(Some(format!("{}/auth/github?{}", self.base_url()?, query)))
    }

    /// Stores a code bound to `user_id` and returns the client redirect
    /// carrying it.
    #[instrument(skip(self, request), fields(client_id = %request.client_id))]
    pub(crate) async fn issue_code(
        &self,
        user_id: UserId,
        request: &AuthorizationRequest,
    ) -> Result<String, Error> {
        let code = AuthorizationCode {
            code: random_token(32),
            user_id,
            client_id: request.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            code_challenge: Some(request.code_challenge.clone()),
            code_challenge_method: Some(pkce::S256.to_string()),
            scopes: request.scopes.clone(),
            expires_at: (Utc::now() + Duration::minutes(CODE_TTL_MINUTES)).timestamp(),
        };

        self.store.save_code(&code).await?;

        let mut location = url::Url::parse(&request.redirect_uri).map_err(|_| {
            Error::OAuth(OAuthErrorKind::InvalidRedirectUri, "Invalid redirect_uri")
        })?;
        {
            let mut pairs = location.query_pairs_mut();
            pairs.append_pair("code", &code.code);
            if let Some(state) = &request.state {
                pairs.append_pair("state", state);
            }
        }

        Ok(location.into())
    }

    pub(crate) async fn authenticate_client(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<OAuthClient, Error> {
        let client = self
            .store
            .get_client(&credentials.client_id)
            .await?
            .ok_or(Error::OAuth(OAuthErrorKind::InvalidClient, "Unknown client"))?;

        if !client.metadata.is_public() {
            let matches = match (&client.client_secret, &credentials.client_secret) {
                (Some(expected), Some(given)) => {
                    constant_time_eq(expected.as_bytes(), given.as_bytes())
                }
                _ => false,
            };

            if !matches {
                return Err(Error::OAuth(
                    OAuthErrorKind::InvalidClient,
                    "Client authentication failed",
                ));
            }
        }

        Ok(client)
    }

    /// Resolves the user a new token is for. A redeemed code is looked up in
    /// storage; a refresh reads `user_id` from the paired access token without
    /// checking its signature, which is only sound because that token was just
    /// found in storage next to the refresh token being redeemed.
    async fn resolve_grant_user(&self, grant: TokenGrant<'_>) -> Result<Option<UserId>, Error> {
        match grant {
            TokenGrant::New { code } => Ok(self.store.get_code(code).await?.map(|c| c.user_id)),
            TokenGrant::Refresh { access_token } => {
                Ok(JwtCodec::decode_unverified::<TokenSubject>(access_token)
                    .ok()
                    .map(|claims| claims.data.user_id))
            }
        }
    }

    /// Signed access token and its expiry, or `None` when no user resolves.
    pub(crate) async fn generate_access_token(
        &self,
        grant: TokenGrant<'_>,
    ) -> Result<Option<(String, i64)>, Error> {
        let Some(user_id) = self.resolve_grant_user(grant).await? else {
            return Ok(None);
        };

        Ok(Some(self.jwt()?.sign_access_token(TokenSubject { user_id })?))
    }

    pub(crate) async fn generate_refresh_token(
        &self,
        grant: TokenGrant<'_>,
    ) -> Result<Option<String>, Error> {
        let Some(user_id) = self.resolve_grant_user(grant).await? else {
            return Ok(None);
        };

        Ok(Some(self.jwt()?.sign_refresh_token(TokenSubject { user_id })?))
    }

    async fn issue_tokens(
        &self,
        client_id: &str,
        scopes: Vec<String>,
        grant: TokenGrant<'_>,
    ) -> Result<(AccessToken, RefreshToken), Error> {
        let unresolved = || {
            Error::OAuth(
                OAuthErrorKind::InvalidGrant,
                "Unable to resolve the authorizing user",
            )
        };

        let (token, expires_at) = self
            .generate_access_token(grant)
            .await?
            .ok_or_else(unresolved)?;
        let refresh_token = self
            .generate_refresh_token(grant)
            .await?
            .ok_or_else(unresolved)?;

        let created_at = Utc::now().timestamp();

        Ok((
            AccessToken {
                token: token.clone(),
                client_id: client_id.to_string(),
                scopes: scopes.clone(),
                expires_at,
                created_at,
            },
            RefreshToken {
                refresh_token,
                client_id: client_id.to_string(),
                scopes,
                access_token: token,
                created_at,
            },
        ))
    }

    #[instrument(skip_all, fields(client_id = %credentials.client_id))]
    pub(crate) async fn exchange_code(
        &self,
        credentials: &ClientCredentials,
        code: &str,
        redirect_uri: Option<&str>,
        code_verifier: Option<&str>,
    ) -> Result<TokenResponse, Error> {
        let client = self.authenticate_client(credentials).await?;

        let stored = self.store.get_code(code).await?.ok_or(Error::OAuth(
            OAuthErrorKind::InvalidGrant,
            "Invalid authorization code",
        ))?;

        if stored.client_id != client.client_id {
            return Err(Error::OAuth(
                OAuthErrorKind::InvalidGrant,
                "Authorization code was issued to another client",
            ));
        }

        if redirect_uri.is_some_and(|uri| uri != stored.redirect_uri) {
            return Err(Error::OAuth(
                OAuthErrorKind::InvalidGrant,
                "redirect_uri does not match the authorization request",
            ));
        }

        if stored.expires_at <= Utc::now().timestamp() {
            self.store.delete_code(code).await?;
            return Err(Error::OAuth(
                OAuthErrorKind::InvalidGrant,
                "Authorization code has expired",
            ));
        }

        if let Some(challenge) = &stored.code_challenge {
            let verifier = code_verifier.ok_or(Error::OAuth(
                OAuthErrorKind::InvalidRequest,
                "code_verifier is required",
            ))?;

            if !pkce::verify_code_challenge(
                challenge,
                stored.code_challenge_method.as_deref(),
                verifier,
            ) {
                self.store.delete_code(code).await?;
                return Err(Error::OAuth(
                    OAuthErrorKind::InvalidGrant,
                    "PKCE verification failed",
                ));
            }
        }

        let (access, refresh) = self
            .issue_tokens(
                &client.client_id,
                stored.scopes.clone(),
                TokenGrant::New { code },
            )
            .await?;

        // TODO: make read-and-delete atomic so two concurrent redemptions of one code cannot both succeed
        self.store.delete_code(code).await?;
        self.store.save_tokens(&access, &refresh).await?;

        tracing::debug!("Redeemed authorization code");

        Ok(token_response(access, refresh))
    }

    #[instrument(skip_all, fields(client_id = %credentials.client_id))]
    pub(crate) async fn refresh(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, Error> {
        let client = self.authenticate_client(credentials).await?;

        let stored = self
            .store
            .get_refresh_token(refresh_token)
            .await?
            .ok_or(Error::OAuth(
                OAuthErrorKind::InvalidGrant,
                "Invalid refresh token",
            ))?;

        if stored.client_id != client.client_id {
            return Err(Error::OAuth(
                OAuthErrorKind::InvalidGrant,
                "Refresh token was issued to another client",
            ));
        }

        let (access, refresh) = self
            .issue_tokens(
                &client.client_id,
                stored.scopes.clone(),
                TokenGrant::Refresh {
                    access_token: &stored.access_token,
                },
            )
            .await?;

        self.store.revoke_refresh_token(&stored).await?;
        self.store.save_tokens(&access, &refresh).await?;

        tracing::debug!("Rotated refresh token");

        Ok(token_response(access, refresh))
    }

    /// The stored access token, if it exists and has not expired.
    pub(crate) async fn authenticate_bearer(
        &self,
        token: &str,
    ) -> Result<Option<AccessToken>, Error> {
        let now = Utc::now().timestamp();

        Ok(self
            .store
            .get_access_token(token)
            .await?
            .filter(|stored| stored.expires_at > now))
    }
}

fn token_response(access: AccessToken, refresh: RefreshToken) -> TokenResponse {
    TokenResponse {
        expires_in: (access.expires_at - Utc::now().timestamp()).max(0),
        scope: access.scopes.join(" "),
        access_token: access.token,
        token_type: "Bearer",
        refresh_token: refresh.refresh_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::user::UserController;
    use crate::core::store::memory_pool;
    use crate::token::SqliteOAuthStore;
    use crate::types::user::GithubUser;

    const REDIRECT: &str = "http://127.0.0.1:6274/oauth/callback";

    struct Fixture {
        tokens: TokenController<SqliteOAuthStore>,
        user_id: UserId,
        client: OAuthClient,
    }

    async fn fixture() -> Fixture {
        let pool = memory_pool().await;
        let user = UserController::new(pool.clone())
            .upsert_github_user(&GithubUser {
                id: 1,
                login: "octocat".into(),
                avatar_url: None,
            })
            .await
            .unwrap();

        let tokens = TokenController::new(
            SqliteOAuthStore::new(pool),
            Some(JwtCodec::new("secret")),
            Some("http://localhost:3000".into()),
        );

        let client = tokens
            .register_client(ClientMetadata {
                redirect_uris: vec![REDIRECT.into()],
                ..ClientMetadata::default()
            })
            .await
            .unwrap();

        Fixture {
            tokens,
            user_id: user.id,
            client,
        }
    }

    fn credentials(client: &OAuthClient) -> ClientCredentials {
        ClientCredentials {
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
        }
    }

    async fn authorize(f: &Fixture, verifier: &str) -> String {
        let request = f
            .tokens
            .validate_authorization(&AuthorizeParams {
                response_type: Some("code".into()),
                client_id: Some(f.client.client_id.clone()),
                redirect_uri: Some(REDIRECT.into()),
                scope: Some("notes".into()),
                state: Some("xyz".into()),
                code_challenge: Some(pkce::generate_code_challenge(verifier)),
                code_challenge_method: Some("S256".into()),
            })
            .await
            .unwrap();

        let location = f.tokens.issue_code(f.user_id, &request).await.unwrap();
        let url = url::Url::parse(&location).unwrap();

        assert_eq!(
            url.query_pairs().find(|(k, _)| k == "state").unwrap().1,
            "xyz"
        );
        url.query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn public_clients_get_no_secret() {
        let f = fixture().await;

        assert!(f.client.client_secret.is_none());
        assert!(f.client.client_id_issued_at > 0);
    }

    #[tokio::test]
    async fn confidential_clients_must_authenticate() {
        let f = fixture().await;
        let client = f
            .tokens
            .register_client(ClientMetadata {
                redirect_uris: vec![REDIRECT.into()],
                token_endpoint_auth_method: Some("client_secret_post".into()),
                ..ClientMetadata::default()
            })
            .await
            .unwrap();

        assert!(client.client_secret.is_some());
        assert!(f.tokens.authenticate_client(&credentials(&client)).await.is_ok());

        let wrong = ClientCredentials {
            client_id: client.client_id.clone(),
            client_secret: Some("nope".into()),
        };
        assert!(matches!(
            f.tokens.authenticate_client(&wrong).await,
            Err(Error::OAuth(OAuthErrorKind::InvalidClient, _))
        ));
    }

    #[tokio::test]
    async fn registration_requires_redirect_uri() {
        let f = fixture().await;

        assert!(matches!(
            f.tokens.register_client(ClientMetadata::default()).await,
            Err(Error::OAuth(OAuthErrorKind::InvalidRedirectUri, _))
        ));
    }

    #[tokio::test]
    async fn authorization_requires_s256_challenge() {
        let f = fixture().await;
        let mut params = AuthorizeParams {
            response_type: Some("code".into()),
            client_id: Some(f.client.client_id.clone()),
            redirect_uri: Some(REDIRECT.into()),
            scope: None,
            state: None,
            code_challenge: None,
            code_challenge_method: None,
        };

        assert!(f.tokens.validate_authorization(&params).await.is_err());

        params.code_challenge = Some("challenge".into());
        params.code_challenge_method = Some("plain".into());
        assert!(f.tokens.validate_authorization(&params).await.is_err());

        params.code_challenge_method = None;
        params.redirect_uri = Some("https://evil.example/cb".into());
        assert!(matches!(
            f.tokens.validate_authorization(&params).await,
            Err(Error::OAuth(OAuthErrorKind::InvalidRequest, _))
        ));
    }

    #[tokio::test]
    async fn login_redirect_only_without_session() {
        let f = fixture().await;
        let session = SessionUser {
            user_id: f.user_id,
            username: "octocat".into(),
        };

        assert_eq!(
            f.tokens
                .authorization_redirect(Some(&session), "http://localhost:3000/authorize")
                .unwrap(),
            None
        );

        let login = f
            .tokens
            .authorization_redirect(None, "http://localhost:3000/authorize?client_id=a")
            .unwrap()
            .unwrap();
        assert_eq!(
            login,
            "http://localhost:3000/auth/github?return_to=http%3A%2F%2Flocalhost%3A3000%2Fauthorize%3Fclient_id%3Da"
        );
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let f = fixture().await;
        let verifier = pkce::generate_code_verifier();
        let code = authorize(&f, &verifier).await;

        let response = f
            .tokens
            .exchange_code(&credentials(&f.client), &code, Some(REDIRECT), Some(&verifier))
            .await
            .unwrap();
        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.scope, "notes");
        assert!(response.expires_in > 0);

        let subject = JwtCodec::new("secret")
            .verify::<TokenSubject>(&response.access_token)
            .unwrap();
        assert_eq!(subject.data.user_id, f.user_id);

        assert_eq!(
            f.tokens
                .generate_access_token(TokenGrant::New { code: &code })
                .await
                .unwrap(),
            None
        );
        assert!(matches!(
            f.tokens
                .exchange_code(&credentials(&f.client), &code, Some(REDIRECT), Some(&verifier))
                .await,
            Err(Error::OAuth(OAuthErrorKind::InvalidGrant, _))
        ));
    }

    #[tokio::test]
    async fn tampered_verifier_is_rejected() {
        let f = fixture().await;
        let verifier = pkce::generate_code_verifier();
        let code = authorize(&f, &verifier).await;

        assert!(matches!(
            f.tokens
                .exchange_code(&credentials(&f.client), &code, None, None)
                .await,
            Err(Error::OAuth(OAuthErrorKind::InvalidRequest, _))
        ));
        assert!(matches!(
            f.tokens
                .exchange_code(&credentials(&f.client), &code, None, Some("tampered"))
                .await,
            Err(Error::OAuth(OAuthErrorKind::InvalidGrant, _))
        ));
    }

    #[tokio::test]
    async fn failed_verification_burns_the_code() {
        let f = fixture().await;
        let verifier = pkce::generate_code_verifier();
        let code = authorize(&f, &verifier).await;

        assert!(
            f.tokens
                .exchange_code(&credentials(&f.client), &code, None, Some("guess"))
                .await
                .is_err()
        );
        assert!(matches!(
            f.tokens
                .exchange_code(&credentials(&f.client), &code, None, Some(&verifier))
                .await,
            Err(Error::OAuth(OAuthErrorKind::InvalidGrant, _))
        ));
    }

    #[tokio::test]
    async fn refresh_rotates_tokens() {
        let f = fixture().await;
        let verifier = pkce::generate_code_verifier();
        let code = authorize(&f, &verifier).await;
        let first = f
            .tokens
            .exchange_code(&credentials(&f.client), &code, None, Some(&verifier))
            .await
            .unwrap();

        let second = f
            .tokens
            .refresh(&credentials(&f.client), &first.refresh_token)
            .await
            .unwrap();

        assert_ne!(first.access_token, second.access_token);
        assert_ne!(first.refresh_token, second.refresh_token);
        assert!(
            f.tokens
                .authenticate_bearer(&first.access_token)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            f.tokens
                .authenticate_bearer(&second.access_token)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            f.tokens
                .refresh(&credentials(&f.client), &first.refresh_token)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn refresh_grant_reads_user_from_access_token() {
        let f = fixture().await;
        let (access_token, _) = JwtCodec::new("another-secret")
            .sign_access_token(TokenSubject { user_id: 77 })
            .unwrap();

        let (token, _) = f
            .tokens
            .generate_access_token(TokenGrant::Refresh {
                access_token: &access_token,
            })
            .await
            .unwrap()
            .unwrap();

        let claims = JwtCodec::new("secret").verify::<TokenSubject>(&token).unwrap();
        assert_eq!(claims.data.user_id, 77);
    }

    #[tokio::test]
    async fn unknown_bearer_is_not_authenticated() {
        let f = fixture().await;

        assert!(f.tokens.authenticate_bearer("missing").await.unwrap().is_none());
    }
}
