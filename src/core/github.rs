use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::core::config::Args;
use crate::core::error::{ConfigError, Error};
use crate::types::user::GithubUser;

const USER_AGENT: &str = "Squiggles-Notes-App";
const SCOPE: &str = "user:email";

#[derive(Serialize)]
struct AuthorizeQuery<'a> {
    client_id: &'a str,
    redirect_uri: &'a str,
    scope: &'a str,
    state: &'a str,
    code_challenge: &'a str,
    code_challenge_method: &'a str,
}

#[derive(Serialize)]
struct ExchangeBody<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    code_verifier: &'a str,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
}

#[derive(Clone)]
pub(crate) struct GithubClient {
    client: reqwest::Client,
    url: String,
    api_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("url", &self.url)
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .finish()
    }
}

impl GithubClient {
    pub(crate) fn new(args: &Args) -> Result<Self, ConfigError> {
        let client = reqwest::ClientBuilder::new()
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: args.github_url.trim_end_matches('/').to_string(),
            api_url: args.github_api_url.trim_end_matches('/').to_string(),
            client_id: args.github_client_id.clone(),
            client_secret: args.github_client_secret.clone(),
        })
    }

    fn client_id(&self) -> Result<&str, Error> {
        self.client_id
            .as_deref()
            .ok_or(Error::ConfigurationMissing("GITHUB_CLIENT_ID"))
    }

    pub(crate) fn ensure_configured(&self) -> Result<(), Error> {
        self.client_id()?;
        self.client_secret
            .as_deref()
            .ok_or(Error::ConfigurationMissing("GITHUB_CLIENT_SECRET"))?;

        Ok(())
    }

    pub(crate) fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: &str,
    ) -> Result<String, Error> {
        let query = serde_urlencoded::to_string(AuthorizeQuery {
            client_id: self.client_id()?,
            redirect_uri,
            scope: SCOPE,
            state,
            code_challenge,
            code_challenge_method: crate::utils::pkce::S256,
        })?;

        Ok(format!("{}/login/oauth/authorize?{}", self.url, query))
    }

    /// Trades the callback code for a GitHub access token. `None` when GitHub
    /// answers without one.
    #[instrument(skip_all)]
    pub(crate) async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<Option<String>, Error> {
        let body = ExchangeBody {
            client_id: self.client_id()?,
            client_secret: self
                .client_secret
                .as_deref()
                .ok_or(Error::ConfigurationMissing("GITHUB_CLIENT_SECRET"))?,
            code,
            code_verifier,
        };

        tracing::debug!("Exchanging authorization code");
        let response = self
            .client
            .post(format!("{}/login/oauth/access_token", self.url))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?
            .json::<ExchangeResponse>()
            .await?;

        Ok(response.access_token.filter(|token| !token.is_empty()))
    }

    #[instrument(skip_all)]
    pub(crate) async fn fetch_user(&self, access_token: &str) -> Result<GithubUser, Error> {
        Ok(self
            .client
            .get(format!("{}/user", self.api_url))
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .send()
            .await?
            .error_for_status()?
            .json::<GithubUser>()
            .await?)
    }
}
