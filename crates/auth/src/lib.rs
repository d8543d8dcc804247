//! `userlink-auth`: credential and token boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: the credential
//! store is a trait, the access gate works on plain header values.

pub mod claims;
pub mod gate;
pub mod password;
pub mod service;
pub mod store;
pub mod token;

pub use claims::{AccessClaims, RefreshClaims};
pub use gate::{AccessGate, AccessTokenValidator, Metadata, extract_bearer};
pub use password::{CredentialHasher, HashCost, PasswordError};
pub use service::{AuthService, TokenPair};
pub use store::{CredentialStore, InMemoryCredentialStore};
pub use token::{TokenError, TokenIssuer, TokenSettings, check_ttl, parse_ttl};
