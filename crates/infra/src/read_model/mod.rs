//! Replica read model: the set of user ids the second service trusts.
//!
//! Records are insert-only. Once an id is present it is never removed, so
//! "known user" answers never regress.

pub mod postgres;
pub mod replica_store;

pub use postgres::PostgresReplicaStore;
pub use replica_store::{InMemoryReplicaStore, ReplicaStore};
