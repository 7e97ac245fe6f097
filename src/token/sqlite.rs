use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::{Row, SqlitePool};

use crate::core::error::Error;
use crate::token::store::OAuthStore;
use crate::types::oauth::{
    AccessToken, AuthorizationCode, ClientMetadata, OAuthClient, RefreshToken,
};

#[derive(Clone, Debug)]
pub(crate) struct SqliteOAuthStore {
    pool: SqlitePool,
}

impl SqliteOAuthStore {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthStore for SqliteOAuthStore {
    async fn save_client(&self, client: &OAuthClient) -> Result<(), Error> {
        let metadata = &client.metadata;

        sqlx::query(
            "INSERT INTO mcp_clients (
                client_id, client_secret, client_id_issued_at, client_secret_expires_at,
                redirect_uris, token_endpoint_auth_method, grant_types, response_types,
                client_name, client_uri, logo_uri, scope, contacts, tos_uri, policy_uri,
                jwks_uri, software_id, software_version, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19);",
        )
        .bind(&client.client_id)
        .bind(&client.client_secret)
        .bind(client.client_id_issued_at)
        .bind(client.client_secret_expires_at)
        .bind(Json(&metadata.redirect_uris))
        .bind(&metadata.token_endpoint_auth_method)
        .bind(metadata.grant_types.as_ref().map(Json))
        .bind(metadata.response_types.as_ref().map(Json))
        .bind(&metadata.client_name)
        .bind(&metadata.client_uri)
        .bind(&metadata.logo_uri)
        .bind(&metadata.scope)
        .bind(metadata.contacts.as_ref().map(Json))
        .bind(&metadata.tos_uri)
        .bind(&metadata.policy_uri)
        .bind(&metadata.jwks_uri)
        .bind(&metadata.software_id)
        .bind(&metadata.software_version)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>, Error> {
        Ok(sqlx::query("SELECT * FROM mcp_clients WHERE client_id = $1;")
            .bind(client_id)
            .map(map_client)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn save_code(&self, code: &AuthorizationCode) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO mcp_codes (
                code, user_id, client_id, redirect_uri, code_challenge,
                code_challenge_method, scopes, expires_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9);",
        )
        .bind(&code.code)
        .bind(code.user_id)
        .bind(&code.client_id)
        .bind(&code.redirect_uri)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(Json(&code.scopes))
        .bind(code.expires_at)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_code(&self, code: &str) -> Result<Option<AuthorizationCode>, Error> {
        Ok(sqlx::query(
            "SELECT code, user_id, client_id, redirect_uri, code_challenge,
                code_challenge_method, scopes, expires_at
            FROM mcp_codes WHERE code = $1;",
        )
        .bind(code)
        .map(map_code)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_code(&self, code: &str) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM mcp_codes WHERE code = $1;")
            .bind(code)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn save_tokens(&self, access: &AccessToken, refresh: &RefreshToken) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO mcp_tokens (token, client_id, scopes, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5);",
        )
        .bind(&access.token)
        .bind(&access.client_id)
        .bind(Json(&access.scopes))
        .bind(access.expires_at)
        .bind(access.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO mcp_refresh_tokens (refresh_token, client_id, scopes, access_token, created_at)
            VALUES ($1, $2, $3, $4, $5);",
        )
        .bind(&refresh.refresh_token)
        .bind(&refresh.client_id)
        .bind(Json(&refresh.scopes))
        .bind(&refresh.access_token)
        .bind(refresh.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessToken>, Error> {
        Ok(sqlx::query(
            "SELECT token, client_id, scopes, expires_at, created_at
            FROM mcp_tokens WHERE token = $1;",
        )
        .bind(token)
        .map(map_access_token)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_refresh_token(&self, refresh_token: &str) -> Result<Option<RefreshToken>, Error> {
        Ok(sqlx::query(
            "SELECT refresh_token, client_id, scopes, access_token, created_at
            FROM mcp_refresh_tokens WHERE refresh_token = $1;",
        )
        .bind(refresh_token)
        .map(map_refresh_token)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn revoke_refresh_token(&self, refresh: &RefreshToken) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM mcp_refresh_tokens WHERE refresh_token = $1;")
            .bind(&refresh.refresh_token)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM mcp_tokens WHERE token = $1;")
            .bind(&refresh.access_token)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

fn json_list(row: &SqliteRow, column: &str) -> Option<Vec<String>> {
    row.get::<Option<Json<Vec<String>>>, _>(column)
        .map(|list| list.0)
}

fn map_client(row: SqliteRow) -> OAuthClient {
    OAuthClient {
        client_id: row.get("client_id"),
        client_secret: row.get("client_secret"),
        client_id_issued_at: row.get("client_id_issued_at"),
        client_secret_expires_at: row.get("client_secret_expires_at"),
        metadata: ClientMetadata {
            redirect_uris: json_list(&row, "redirect_uris").unwrap_or_default(),
            token_endpoint_auth_method: row.get("token_endpoint_auth_method"),
            grant_types: json_list(&row, "grant_types"),
            response_types: json_list(&row, "response_types"),
            client_name: row.get("client_name"),
            client_uri: row.get("client_uri"),
            logo_uri: row.get("logo_uri"),
            scope: row.get("scope"),
            contacts: json_list(&row, "contacts"),
            tos_uri: row.get("tos_uri"),
            policy_uri: row.get("policy_uri"),
            jwks_uri: row.get("jwks_uri"),
            software_id: row.get("software_id"),
            software_version: row.get("software_version"),
        },
    }
}

fn map_code(row: SqliteRow) -> AuthorizationCode {
    AuthorizationCode {
        code: row.get("code"),
        user_id: row.get("user_id"),
        client_id: row.get("client_id"),
        redirect_uri: row.get("redirect_uri"),
        code_challenge: row.get("code_challenge"),
        code_challenge_method: row.get("code_challenge_method"),
        scopes: json_list(&row, "scopes").unwrap_or_default(),
        expires_at: row.get("expires_at"),
    }
}

fn map_access_token(row: SqliteRow) -> AccessToken {
    AccessToken {
        token: row.get("token"),
        client_id: row.get("client_id"),
        scopes: json_list(&row, "scopes").unwrap_or_default(),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }
}

fn map_refresh_token(row: SqliteRow) -> RefreshToken {
    RefreshToken {
        refresh_token: row.get("refresh_token"),
        client_id: row.get("client_id"),
        scopes: json_list(&row, "scopes").unwrap_or_default(),
        access_token: row.get("access_token"),
        created_at: row.get("created_at"),
    }
}
