use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use userlink_core::{User, UserId};

/// Claims carried by an access token.
///
/// Decoding into this struct is the type check: a token whose `userId` is
/// missing or not an integer, or that lacks `username`, never becomes an
/// `AccessClaims` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(rename = "userId")]
    pub user_id: UserId,

    pub username: String,

    /// Expiration, unix seconds.
    pub exp: i64,
}

impl AccessClaims {
    pub fn for_user(user: &User, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            exp: expires_at.timestamp(),
        }
    }
}

/// Claims carried by a refresh token.
///
/// Unknown fields are rejected so an access token (which also carries
/// `username`) cannot be replayed as a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    #[serde(rename = "userId")]
    pub user_id: UserId,

    /// Expiration, unix seconds.
    pub exp: i64,
}

impl RefreshClaims {
    pub fn for_user_id(user_id: UserId, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            exp: expires_at.timestamp(),
        }
    }
}

/// Common expiry accessor used by token verification.
pub(crate) trait Expiring {
    fn exp(&self) -> i64;
}

impl Expiring for AccessClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}

impl Expiring for RefreshClaims {
    fn exp(&self) -> i64 {
        self.exp
    }
}
