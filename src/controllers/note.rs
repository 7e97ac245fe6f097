use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::core::error::Error;
use crate::types::note::{Note, NoteChanges};
use crate::types::user::UserId;

const DEFAULT_TITLE: &str = "Untitled";

/// Note storage. Every query is scoped to the owning user, so a foreign note
/// id behaves exactly like a missing one.
#[derive(Clone, Debug)]
pub(crate) struct NoteController {
    pool: SqlitePool,
}

impl NoteController {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub(crate) async fn list(&self, user_id: UserId) -> Result<Vec<Note>, Error> {
        Ok(sqlx::query(
            "SELECT id, user_id, title, content, created_at, updated_at
            FROM notes
            WHERE user_id = $1
            ORDER BY updated_at DESC, id DESC;",
        )
        .bind(user_id)
        .map(map_note)
        .fetch_all(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    pub(crate) async fn get(&self, user_id: UserId, id: i64) -> Result<Option<Note>, Error> {
        Ok(sqlx::query(
            "SELECT id, user_id, title, content, created_at, updated_at
            FROM notes
            WHERE id = $1 AND user_id = $2;",
        )
        .bind(id)
        .bind(user_id)
        .map(map_note)
        .fetch_optional(&self.pool)
        .await?)
    }

    #[instrument(skip(self, content))]
    pub(crate) async fn create(
        &self,
        user_id: UserId,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<Note, Error> {
        let now = Utc::now().timestamp();

        Ok(sqlx::query(
            "INSERT INTO notes (user_id, title, content, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING id, user_id, title, content, created_at, updated_at;",
        )
        .bind(user_id)
        .bind(title.unwrap_or(DEFAULT_TITLE))
        .bind(content.unwrap_or_default())
        .bind(now)
        .map(map_note)
        .fetch_one(&self.pool)
        .await?)
    }

    /// Applies the given changes and bumps `updated_at`. `None` when the note
    /// does not exist or belongs to someone else.
    #[instrument(skip(self, changes))]
    pub(crate) async fn update(
        &self,
        user_id: UserId,
        id: i64,
        changes: NoteChanges,
    ) -> Result<Option<Note>, Error> {
        Ok(sqlx::query(
            "UPDATE notes SET
                title = COALESCE($1, title),
                content = COALESCE($2, content),
                updated_at = $3
            WHERE id = $4 AND user_id = $5
            RETURNING id, user_id, title, content, created_at, updated_at;",
        )
        .bind(changes.title)
        .bind(changes.content)
        .bind(Utc::now().timestamp())
        .bind(id)
        .bind(user_id)
        .map(map_note)
        .fetch_optional(&self.pool)
        .await?)
    }

    #[instrument(skip(self))]
    pub(crate) async fn delete(&self, user_id: UserId, id: i64) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1 AND user_id = $2;")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn map_note(row: SqliteRow) -> Note {
    Note {
        id: row.get("id"),
        user_id: row.get("user_id"),
        title: row.get("title"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
