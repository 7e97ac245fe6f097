use serde::{Deserialize, Serialize};

pub type UserId = i64;

#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: UserId,
    pub github_id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: i64,
}

/// The identity carried by the `session` cookie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: UserId,
    pub username: String,
}

/// The identity carried by MCP access and refresh tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSubject {
    pub user_id: UserId,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct GithubUser {
    pub(crate) id: i64,
    pub(crate) login: String,
    pub(crate) avatar_url: Option<String>,
}
