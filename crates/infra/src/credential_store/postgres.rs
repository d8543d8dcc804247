//! Postgres-backed primary user store.
//!
//! Usernames are unique at the database level, so concurrent registrations
//! of the same name resolve to exactly one row and one `Conflict`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use userlink_auth::CredentialStore;
use userlink_core::{StoreError, User, UserId};

use crate::db::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<User, StoreError> {
        let decode = |e: sqlx::Error| StoreError::backend(format!("failed to decode user row: {e}"));
        let id: i64 = row.try_get("id").map_err(decode)?;
        let username: String = row.try_get("username").map_err(decode)?;
        let password: Vec<u8> = row.try_get("password").map_err(decode)?;
        Ok(User::new(UserId::new(id), username, password))
    }
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self, password_hash), err)]
    async fn save_user(&self, username: &str, password_hash: &[u8]) -> Result<UserId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, password) VALUES ($1, $2) RETURNING id",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_user", e))?;

        Ok(UserId::new(id))
    }

    #[instrument(skip(self), err)]
    async fn get_user_by_username(&self, username: &str) -> Result<User, StoreError> {
        let row = sqlx::query("SELECT id, username, password FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user_by_username", e))?
            .ok_or_else(|| StoreError::not_found("user", "username", username))?;

        Self::row_to_user(&row)
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError> {
        let row = sqlx::query("SELECT id, username, password FROM users WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user_by_id", e))?
            .ok_or_else(|| StoreError::not_found("user", "id", id))?;

        Self::row_to_user(&row)
    }

    #[instrument(skip(self), err)]
    async fn list_all_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users ORDER BY id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_all_user_ids", e))?;

        Ok(ids.into_iter().map(UserId::new).collect())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
