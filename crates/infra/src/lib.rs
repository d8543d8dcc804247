//! Infrastructure layer: Postgres stores, Redis broker, config, replication workers.

pub mod config;
pub mod credential_store;
pub mod db;
pub mod event_bus;
pub mod read_model;
pub mod workers;

pub use config::{AuthConfig, BrokerConfig, Config, ConfigError, ReplicationConfig};
pub use credential_store::PostgresCredentialStore;
pub use read_model::{InMemoryReplicaStore, PostgresReplicaStore, ReplicaStore};
pub use workers::{
    Ingested, PublishedIdSet, ReplicationConsumer, ReplicationError, ReplicationProducer,
    TickReport, WorkerHandle, WorkerState,
};
