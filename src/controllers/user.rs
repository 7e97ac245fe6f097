use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::core::error::Error;
use crate::types::user::{GithubUser, User, UserId};

#[derive(Clone, Debug)]
pub(crate) struct UserController {
    pool: SqlitePool,
}

impl UserController {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub(crate) async fn get_user_by_id(&self, id: UserId) -> Result<Option<User>, Error> {
        Ok(sqlx::query(
            "SELECT id, github_id, username, avatar_url, created_at FROM users WHERE id = $1;",
        )
        .bind(id)
        .map(map_user)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Inserts the GitHub account on first login. A repeat login keeps the
    /// row and refreshes its username and avatar.
    #[instrument(skip(self, github_user), fields(github_id = github_user.id))]
    pub(crate) async fn upsert_github_user(&self, github_user: &GithubUser) -> Result<User, Error> {
        let user = sqlx::query(
            "INSERT INTO users (github_id, username, avatar_url, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (github_id) DO UPDATE SET
                username = excluded.username,
                avatar_url = excluded.avatar_url
            RETURNING id, github_id, username, avatar_url, created_at;",
        )
        .bind(github_user.id)
        .bind(&github_user.login)
        .bind(&github_user.avatar_url)
        .bind(Utc::now().timestamp())
        .map(map_user)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(user_id = user.id, "Signed in GitHub user");

        Ok(user)
    }
}

fn map_user(row: SqliteRow) -> User {
    User {
        id: row.get("id"),
        github_id: row.get("github_id"),
        username: row.get("username"),
        avatar_url: row.get("avatar_url"),
        created_at: row.get("created_at"),
    }
}
