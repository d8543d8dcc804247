//! Credential store adapters.
//!
//! The trait and the in-memory implementation live in `userlink-auth`; this
//! module provides the persistent backend.

pub mod postgres;

pub use postgres::PostgresCredentialStore;
