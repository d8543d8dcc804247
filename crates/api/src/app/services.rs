//! Infrastructure wiring for both binaries.
//!
//! Without `DATABASE_URL`/`REPLICA_DATABASE_URL` the in-memory stores are
//! used, which is only useful for local development. Without `BROKER_URL` the
//! auth side has no broker and runs no producer; the replica side falls back
//! to an in-process broker that nothing publishes to.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use userlink_auth::{AuthService, CredentialHasher, CredentialStore, InMemoryCredentialStore, TokenIssuer};
use userlink_events::{Broker, InMemoryBroker};
use userlink_infra::event_bus::{RedisStreamsBroker, RedisStreamsOptions};
use userlink_infra::{
    Config, InMemoryReplicaStore, PostgresCredentialStore, PostgresReplicaStore, ReplicaStore, db,
};

pub type SharedCredentialStore = Arc<dyn CredentialStore>;
pub type SharedAuthService = Arc<AuthService<SharedCredentialStore>>;
pub type SharedReplicaStore = Arc<dyn ReplicaStore>;
pub type SharedBroker = Arc<dyn Broker>;

pub struct AuthServices {
    pub auth: SharedAuthService,
    pub store: SharedCredentialStore,
    /// `None` when `BROKER_URL` is unset.
    pub broker: Option<SharedBroker>,
}

pub struct ReplicaServices {
    pub replica: SharedReplicaStore,
    pub broker: SharedBroker,
}

/// Auth service with an explicit store (used by tests and by `build_auth_services`).
pub fn auth_service(config: &Config, store: SharedCredentialStore) -> anyhow::Result<SharedAuthService> {
    let settings = config.auth.token_settings()?;
    let hasher = CredentialHasher::new(config.auth.hash_cost)?;
    Ok(Arc::new(AuthService::new(store, TokenIssuer::new(&settings), hasher)))
}

pub async fn build_auth_services(config: &Config) -> anyhow::Result<AuthServices> {
    let store: SharedCredentialStore = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url).await.context("connecting to DATABASE_URL")?;
            db::migrate_credentials(&pool).await?;
            info!("credential store: postgres");
            Arc::new(PostgresCredentialStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory credential store");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    Ok(AuthServices {
        auth: auth_service(config, store.clone())?,
        store,
        broker: match config.broker.url {
            Some(_) => Some(build_broker(config)?),
            None => {
                warn!("BROKER_URL not set; user ids will not be replicated");
                None
            }
        },
    })
}

pub async fn build_replica_services(config: &Config) -> anyhow::Result<ReplicaServices> {
    let replica: SharedReplicaStore = match &config.replica_database_url {
        Some(url) => {
            let pool = db::connect(url)
                .await
                .context("connecting to REPLICA_DATABASE_URL")?;
            db::migrate_replica(&pool).await?;
            info!("replica store: postgres");
            Arc::new(PostgresReplicaStore::new(pool))
        }
        None => {
            warn!("REPLICA_DATABASE_URL not set; using in-memory replica store");
            Arc::new(InMemoryReplicaStore::new())
        }
    };

    Ok(ReplicaServices {
        replica,
        broker: build_broker(config)?,
    })
}

fn build_broker(config: &Config) -> anyhow::Result<SharedBroker> {
    match &config.broker.url {
        Some(url) => {
            let options = RedisStreamsOptions::new(
                config.broker.group.clone(),
                config.broker.consumer.clone(),
                config.replication.consumer_tick,
            )
            .with_claim_idle(config.replication.claim_idle);
            info!(topic = %config.broker.topic, consumer = %config.broker.consumer, "broker: redis streams");
            Ok(Arc::new(RedisStreamsBroker::new(url, options)?))
        }
        None => {
            warn!("BROKER_URL not set; using in-process broker (no cross-process replication)");
            Ok(Arc::new(InMemoryBroker::new()))
        }
    }
}
