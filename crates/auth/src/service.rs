//! Register / Login / Refresh / Validate.
//!
//! Every operation takes plain values and returns either a result or a
//! classified [`Error`]. Security failures are terminal for the call; nothing
//! here retries.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use userlink_core::{CoreResult, Error, User, UserId};

use crate::password::CredentialHasher;
use crate::store::CredentialStore;
use crate::token::TokenIssuer;

/// Access/refresh token pair returned by login and refresh.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl core::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}

#[derive(Debug, Clone)]
pub struct AuthService<S> {
    store: S,
    issuer: TokenIssuer,
    hasher: CredentialHasher,
}

impl<S> AuthService<S>
where
    S: CredentialStore,
{
    pub fn new(store: S, issuer: TokenIssuer, hasher: CredentialHasher) -> Self {
        Self {
            store,
            issuer,
            hasher,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub async fn register(&self, username: &str, password: &str) -> CoreResult<UserId> {
        require("Username", username)?;
        require("Password", password)?;

        let hash = self.hash_password(password).await?;
        let id = self.store.save_user(username, &hash).await?;

        info!(user_id = %id, "user registered");
        Ok(id)
    }

    pub async fn login(&self, username: &str, password: &str) -> CoreResult<TokenPair> {
        require("Username", username)?;
        require("Password", password)?;

        let user = self.store.get_user_by_username(username).await?;
        if !self.verify_password(password, &user).await? {
            warn!(user_id = %user.id, "login rejected: password mismatch");
            return Err(Error::unauthenticated("invalid username or password"));
        }

        let pair = self.issue_pair(&user)?;
        info!(user_id = %user.id, "login succeeded");
        Ok(pair)
    }

    /// Exchange a refresh token for a fresh pair. Both tokens rotate.
    pub async fn refresh_token(&self, refresh_token: &str) -> CoreResult<TokenPair> {
        let claims = self.issuer.verify_refresh(refresh_token, Utc::now())?;
        let user = self.store.get_user_by_id(claims.user_id).await?;

        let pair = self.issue_pair(&user)?;
        debug!(user_id = %user.id, "refresh token rotated");
        Ok(pair)
    }

    /// Pure verification: `Ok(true)` or `Unauthenticated`.
    pub fn validate_access_token(&self, access_token: &str) -> CoreResult<bool> {
        self.issuer.verify_access(access_token, Utc::now())?;
        Ok(true)
    }

    fn issue_pair(&self, user: &User) -> CoreResult<TokenPair> {
        let now = Utc::now();
        Ok(TokenPair {
            access_token: self.issuer.issue_access_token(user, now)?,
            refresh_token: self.issuer.issue_refresh_token(user.id, now)?,
        })
    }

    async fn hash_password(&self, password: &str) -> CoreResult<Vec<u8>> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| Error::internal(format!("hashing task failed: {e}")))??;
        Ok(hash)
    }

    async fn verify_password(&self, password: &str, user: &User) -> CoreResult<bool> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(|e| Error::internal(format!("verification task failed: {e}")))??;
        Ok(matches)
    }
}

fn require(field: &'static str, value: &str) -> CoreResult<()> {
    if value.is_empty() {
        return Err(Error::invalid_input(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use userlink_core::ErrorKind;

    use super::*;
    use crate::password::HashCost;
    use crate::store::InMemoryCredentialStore;
    use crate::token::TokenSettings;

    fn service() -> AuthService<InMemoryCredentialStore> {
        service_with(TokenSettings::new("test-secret", "15m", "720h"))
    }

    fn service_with(settings: TokenSettings) -> AuthService<InMemoryCredentialStore> {
        let hasher = CredentialHasher::new(HashCost {
            iterations: 1,
            memory_kib: 8,
        })
        .unwrap();
        AuthService::new(
            InMemoryCredentialStore::new(),
            TokenIssuer::new(&settings),
            hasher,
        )
    }

    #[tokio::test]
    async fn register_then_login_yields_a_valid_access_token() {
        let svc = service();
        let id = svc.register("alice", "correctpw").await.unwrap();

        let pair = svc.login("alice", "correctpw").await.unwrap();
        assert_eq!(svc.validate_access_token(&pair.access_token), Ok(true));

        let claims = svc.issuer().verify_access(&pair.access_token, Utc::now()).unwrap();
        assert_eq!(claims.user_id, id);
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn stored_hash_is_not_the_password() {
        let svc = service();
        svc.register("alice", "correctpw").await.unwrap();
        let user = svc.store().get_user_by_username("alice").await.unwrap();
        assert_ne!(user.password_hash, b"correctpw".to_vec());
    }

    #[tokio::test]
    async fn wrong_password_is_unauthenticated() {
        let svc = service();
        svc.register("alice", "correctpw").await.unwrap();

        let err = svc.login("alice", "wrongpw").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn empty_fields_are_invalid_input() {
        let svc = service();

        let err = svc.register("", "pw").await.unwrap_err();
        assert_eq!(err, Error::invalid_input("Username"));
        assert_eq!(err.to_string(), "you must fill the 'Username' value");

        let err = svc.login("alice", "").await.unwrap_err();
        assert_eq!(err, Error::invalid_input("Password"));
    }

    #[tokio::test]
    async fn unknown_username_is_not_found() {
        let err = service().login("ghost", "pw").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let svc = service();
        svc.register("alice", "pw").await.unwrap();
        let err = svc.register("alice", "other").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn store_outage_is_internal() {
        let svc = service();
        svc.store().set_unavailable(true);
        let err = svc.register("alice", "pw").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "internal error");
    }

    #[tokio::test]
    async fn refresh_preserves_user_id() {
        let svc = service();
        let id = svc.register("alice", "pw").await.unwrap();
        let pair = svc.login("alice", "pw").await.unwrap();

        let rotated = svc.refresh_token(&pair.refresh_token).await.unwrap();
        let access = svc.issuer().verify_access(&rotated.access_token, Utc::now()).unwrap();
        let refresh = svc
            .issuer()
            .verify_refresh(&rotated.refresh_token, Utc::now())
            .unwrap();
        assert_eq!(access.user_id, id);
        assert_eq!(refresh.user_id, id);
    }

    #[tokio::test]
    async fn refresh_rejects_malformed_and_foreign_tokens() {
        let svc = service();
        svc.register("alice", "pw").await.unwrap();
        let pair = svc.login("alice", "pw").await.unwrap();

        for bad in ["", "only.two", "a.b.c.d", pair.access_token.as_str()] {
            let err = svc.refresh_token(bad).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthenticated, "token {bad:?}");
        }
    }

    #[tokio::test]
    async fn refresh_for_deleted_user_is_not_found() {
        let svc = service();
        let token = svc
            .issuer()
            .issue_refresh_token(UserId::new(99), Utc::now())
            .unwrap();
        let err = svc.refresh_token(&token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn expired_refresh_token_is_rejected() {
        let svc = service();
        let id = svc.register("alice", "pw").await.unwrap();

        let stale = svc
            .issuer()
            .issue_refresh_token(id, Utc::now() - chrono::Duration::hours(721))
            .unwrap();
        let err = svc.refresh_token(&stale).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn refresh_with_spliced_signature_is_rejected() {
        let svc = service();
        let alice = svc.register("alice", "pw").await.unwrap();
        let bob = svc.register("bob", "pw").await.unwrap();
        let genuine = svc.issuer().issue_refresh_token(alice, Utc::now()).unwrap();
        let other = svc.issuer().issue_refresh_token(bob, Utc::now()).unwrap();

        let g: Vec<&str> = genuine.split('.').collect();
        let o: Vec<&str> = other.split('.').collect();
        let tampered = format!("{}.{}.{}", g[0], o[1], g[2]);

        let err = svc.refresh_token(&tampered).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);

        let foreign = TokenIssuer::new(&TokenSettings::new("other-secret", "15m", "720h"))
            .issue_refresh_token(alice, Utc::now())
            .unwrap();
        let err = svc.refresh_token(&foreign).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        let svc = service();
        svc.register("alice", "pw").await.unwrap();
        let user = svc.store().get_user_by_username("alice").await.unwrap();

        let stale = svc
            .issuer()
            .issue_access_token(&user, Utc::now() - chrono::Duration::hours(1))
            .unwrap();
        let err = svc.validate_access_token(&stale).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn overflowing_ttl_fails_login_as_internal() {
        let svc = service_with(TokenSettings::new("s", "15m", "200000000years"));
        svc.register("alice", "pw").await.unwrap();
        let err = svc.login("alice", "pw").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn unparsable_ttl_fails_login_as_internal() {
        let svc = service_with(TokenSettings::new("s", "fifteen", "720h"));
        svc.register("alice", "pw").await.unwrap();
        let err = svc.login("alice", "pw").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
