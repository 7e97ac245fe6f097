use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Args {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub jwt_secret: Option<String>,
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<String>,
    pub redirect_base_url: Option<String>,
    #[serde(default = "default_github_url")]
    pub github_url: String,
    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("database_url", &self.database_url)
            .field("log_level", &self.log_level)
            .field("port", &self.port)
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("github_client_id", &self.github_client_id)
            .field("github_client_secret", &redact(&self.github_client_secret))
            .field("redirect_base_url", &self.redirect_base_url)
            .field("github_url", &self.github_url)
            .field("github_api_url", &self.github_api_url)
            .finish()
    }
}

impl Args {
    /// Names of the settings the login and MCP flows need but that were not provided.
    pub(crate) fn missing_settings(&self) -> Vec<&'static str> {
        [
            ("JWT_SECRET", self.jwt_secret.is_none()),
            ("GITHUB_CLIENT_ID", self.github_client_id.is_none()),
            ("GITHUB_CLIENT_SECRET", self.github_client_secret.is_none()),
            ("REDIRECT_BASE_URL", self.redirect_base_url.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }
}

impl Default for Args {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            log_level: default_log_level(),
            port: default_port(),
            jwt_secret: None,
            github_client_id: None,
            github_client_secret: None,
            redirect_base_url: None,
            github_url: default_github_url(),
            github_api_url: default_github_api_url(),
        }
    }
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<redacted>")
}

fn default_database_url() -> String {
    "sqlite://squiggles.db?mode=rwc".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_github_url() -> String {
    "https://github.com".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}
