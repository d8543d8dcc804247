//! Postgres-backed replica store.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use userlink_core::{StoreError, UserId};

use super::ReplicaStore;
use crate::db::map_sqlx_error;

/// `replica_user_ids(user_id BIGINT PRIMARY KEY)`.
///
/// The primary key makes a racing duplicate insert fail with `23505`, which
/// surfaces as `StoreError::Conflict`.
#[derive(Debug, Clone)]
pub struct PostgresReplicaStore {
    pool: Arc<PgPool>,
}

impl PostgresReplicaStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ReplicaStore for PostgresReplicaStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn exists_user_id(&self, id: UserId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM replica_user_ids WHERE user_id = $1)")
            .bind(id.get())
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("exists_user_id", e))
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn insert_user_id(&self, id: UserId) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO replica_user_ids (user_id) VALUES ($1)")
            .bind(id.get())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_user_id", e))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
