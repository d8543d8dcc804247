use serde::{Deserialize, Serialize};

use userlink_core::UserId;

// -------------------------
// Request DTOs
// -------------------------

/// Missing fields deserialize as empty and are rejected as invalid input.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
}

#[derive(Debug, Serialize)]
pub struct KnownUserResponse {
    pub user_id: UserId,
    pub known: bool,
}
