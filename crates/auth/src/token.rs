//! Token issuance and verification (HS256 JWT).
//!
//! `TokenIssuer` is stateless apart from immutable key material and TTL
//! configuration, so a single instance can be shared across any number of
//! concurrent callers without locking.
//!
//! Verification takes the reference time as a parameter. Expiry is checked
//! here rather than by `jsonwebtoken` so the rule is exactly `exp > now`
//! with no leeway.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use userlink_core::{Error, User, UserId};

use crate::claims::{AccessClaims, Expiring, RefreshClaims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is empty")]
    Empty,

    #[error("token must have 3 segments, found {0}")]
    Segments(usize),

    /// Bad signature, wrong algorithm, or claims of the wrong shape.
    #[error("token rejected: {0}")]
    Invalid(String),

    #[error("token expired")]
    Expired,

    #[error("invalid token ttl '{value}': {reason}")]
    Ttl { value: String, reason: String },

    #[error("token signing failed: {0}")]
    Signing(String),
}

impl From<TokenError> for Error {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::Ttl { .. } | TokenError::Signing(_) => Error::internal(value.to_string()),
            other => Error::unauthenticated(other.to_string()),
        }
    }
}

/// Signing secret and token lifetimes.
///
/// TTLs are kept as the raw configured strings (`"15m"`, `"720h"`) and parsed
/// on each issuance.
#[derive(Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub access_ttl: String,
    pub refresh_ttl: String,
}

impl TokenSettings {
    pub fn new(
        secret: impl Into<String>,
        access_ttl: impl Into<String>,
        refresh_ttl: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: access_ttl.into(),
            refresh_ttl: refresh_ttl.into(),
        }
    }
}

impl core::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Parse a humantime TTL such as `"15m"` or `"720h"`.
pub fn parse_ttl(raw: &str) -> Result<chrono::Duration, TokenError> {
    let ttl_err = |reason: String| TokenError::Ttl {
        value: raw.to_string(),
        reason,
    };
    let std_ttl = humantime::parse_duration(raw).map_err(|e| ttl_err(e.to_string()))?;
    chrono::Duration::from_std(std_ttl).map_err(|e| ttl_err(e.to_string()))
}

/// `now + ttl`, or a `Ttl` error when the sum leaves the representable range.
fn expiry_after(now: DateTime<Utc>, raw: &str) -> Result<DateTime<Utc>, TokenError> {
    let ttl = parse_ttl(raw)?;
    now.checked_add_signed(ttl).ok_or_else(|| TokenError::Ttl {
        value: raw.to_string(),
        reason: "expiry overflows the supported date range".to_string(),
    })
}

/// Reject a TTL that would fail at issuance time.
pub fn check_ttl(raw: &str) -> Result<(), TokenError> {
    expiry_after(Utc::now(), raw).map(|_| ())
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: String,
    refresh_ttl: String,
}

impl TokenIssuer {
    pub fn new(settings: &TokenSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            access_ttl: settings.access_ttl.clone(),
            refresh_ttl: settings.refresh_ttl.clone(),
        }
    }

    pub fn issue_access_token(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let expires_at = expiry_after(now, &self.access_ttl)?;
        self.sign(&AccessClaims::for_user(user, expires_at))
    }

    pub fn issue_refresh_token(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let expires_at = expiry_after(now, &self.refresh_ttl)?;
        self.sign(&RefreshClaims::for_user_id(user_id, expires_at))
    }

    pub fn verify_access(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        self.verify(token, now)
    }

    pub fn verify_refresh(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshClaims, TokenError> {
        self.verify(token, now)
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    fn verify<C>(&self, token: &str, now: DateTime<Utc>) -> Result<C, TokenError>
    where
        C: DeserializeOwned + Expiring,
    {
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        let segments = token.split('.').count();
        if segments != 3 {
            return Err(TokenError::Segments(segments));
        }

        let data = decode::<C>(token, &self.decoding, &self.validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if data.claims.exp() <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&TokenSettings::new("test-secret", "15m", "720h"))
    }

    fn alice() -> User {
        User::new(UserId::new(42), "alice", b"hash".to_vec())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn access_token_round_trips_claims() {
        let now = at(1_700_000_000);
        let token = issuer().issue_access_token(&alice(), now).unwrap();
        let claims = issuer().verify_access(&token, now).unwrap();

        assert_eq!(claims.user_id, UserId::new(42));
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp, 1_700_000_000 + 15 * 60);
    }

    #[test]
    fn expiry_is_strict() {
        let issued = at(1_700_000_000);
        let token = issuer().issue_access_token(&alice(), issued).unwrap();
        let exp = 1_700_000_000 + 15 * 60;

        assert!(issuer().verify_access(&token, at(exp - 1)).is_ok());
        assert_eq!(
            issuer().verify_access(&token, at(exp)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let now = at(1_700_000_000);
        let foreign = TokenIssuer::new(&TokenSettings::new("other-secret", "15m", "720h"));
        let token = foreign.issue_access_token(&alice(), now).unwrap();

        assert!(matches!(
            issuer().verify_access(&token, now),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn spliced_signature_is_rejected() {
        let now = at(1_700_000_000);
        let genuine = issuer().issue_refresh_token(UserId::new(42), now).unwrap();
        let forged = issuer().issue_refresh_token(UserId::new(7), now).unwrap();

        let genuine_parts: Vec<&str> = genuine.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let tampered = format!("{}.{}.{}", genuine_parts[0], forged_parts[1], genuine_parts[2]);

        assert!(matches!(
            issuer().verify_refresh(&tampered, now),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn structural_problems_are_reported_before_decoding() {
        let now = at(1_700_000_000);
        assert_eq!(issuer().verify_refresh("", now), Err(TokenError::Empty));
        assert_eq!(
            issuer().verify_refresh("a.b", now),
            Err(TokenError::Segments(2))
        );
        assert_eq!(
            issuer().verify_refresh("a.b.c.d", now),
            Err(TokenError::Segments(4))
        );
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let now = at(1_700_000_000);
        let access = issuer().issue_access_token(&alice(), now).unwrap();
        let refresh = issuer().issue_refresh_token(UserId::new(42), now).unwrap();

        assert!(matches!(
            issuer().verify_refresh(&access, now),
            Err(TokenError::Invalid(_))
        ));
        assert!(matches!(
            issuer().verify_access(&refresh, now),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn bad_ttl_is_internal() {
        let broken = TokenIssuer::new(&TokenSettings::new("s", "soon", "720h"));
        let err = broken
            .issue_access_token(&alice(), at(1_700_000_000))
            .unwrap_err();

        assert!(matches!(err, TokenError::Ttl { .. }));
        assert_eq!(Error::from(err).kind(), userlink_core::ErrorKind::Internal);
    }

    #[test]
    fn ttl_overflowing_the_calendar_is_internal_not_a_panic() {
        let broken = TokenIssuer::new(&TokenSettings::new("s", "200000000years", "720h"));
        assert!(parse_ttl("200000000years").is_ok());

        let err = broken
            .issue_access_token(&alice(), at(1_700_000_000))
            .unwrap_err();
        assert!(matches!(err, TokenError::Ttl { .. }));
        assert_eq!(Error::from(err).kind(), userlink_core::ErrorKind::Internal);

        assert!(check_ttl("200000000years").is_err());
        assert!(check_ttl("15m").is_ok());
    }

    #[test]
    fn verification_failures_are_unauthenticated() {
        let err: Error = TokenError::Expired.into();
        assert_eq!(err.kind(), userlink_core::ErrorKind::Unauthenticated);
    }

    #[test]
    fn settings_debug_hides_secret() {
        let rendered = format!("{:?}", TokenSettings::new("hunter2", "15m", "720h"));
        assert!(!rendered.contains("hunter2"));
    }
}
