//! User record owned by the credential store.

use crate::UserId;

/// A registered user.
///
/// Created once at registration and immutable afterwards. `password_hash`
/// holds the encoded one-way hash, never the password itself.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: Vec<u8>,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>, password_hash: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            username: username.into(),
            password_hash: password_hash.into(),
        }
    }
}

impl core::fmt::Debug for User {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}
