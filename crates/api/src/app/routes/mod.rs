pub mod auth;
pub mod replica;
pub mod system;
