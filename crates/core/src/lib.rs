//! `userlink-core`: shared identity model and error taxonomy.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod store;
pub mod user;

pub use error::{CoreResult, Error, ErrorKind};
pub use id::UserId;
pub use store::StoreError;
pub use user::User;
