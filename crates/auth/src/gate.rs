//! Bearer-token interceptor.
//!
//! The gate is transport-neutral: it reads an `authorization` entry from
//! request [`Metadata`] (or a raw header value) and delegates verification to
//! an [`AccessTokenValidator`]. HTTP middleware in the api crate is a thin
//! wrapper around [`AccessGate::check_header`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use userlink_core::{CoreResult, Error, ErrorKind};

use crate::store::CredentialStore;
use crate::{AuthService, TokenIssuer};

pub const AUTHORIZATION: &str = "authorization";

/// Verifies an access token. `Ok(true)` or an `Unauthenticated` error.
pub trait AccessTokenValidator: Send + Sync {
    fn validate_access_token(&self, token: &str) -> CoreResult<bool>;
}

impl AccessTokenValidator for TokenIssuer {
    fn validate_access_token(&self, token: &str) -> CoreResult<bool> {
        self.verify_access(token, Utc::now())?;
        Ok(true)
    }
}

impl<S> AccessTokenValidator for AuthService<S>
where
    S: CredentialStore,
{
    fn validate_access_token(&self, token: &str) -> CoreResult<bool> {
        AuthService::validate_access_token(self, token)
    }
}

impl<V> AccessTokenValidator for Arc<V>
where
    V: AccessTokenValidator + ?Sized,
{
    fn validate_access_token(&self, token: &str) -> CoreResult<bool> {
        (**self).validate_access_token(token)
    }
}

/// Request metadata: lower-cased keys, possibly several values per key.
///
/// For transports that hand headers over as a map, such as an RPC server
/// interceptor. No such transport ships in this workspace yet; the HTTP
/// binaries go through [`AccessGate::check_header`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: BTreeMap<String, Vec<String>>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Extract the token from `Bearer <token>`.
///
/// The value must split on single spaces into exactly two parts, the first
/// being the literal `Bearer` and the second a non-empty token.
pub fn extract_bearer(header: &str) -> CoreResult<&str> {
    let parts: Vec<&str> = header.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] if !token.is_empty() => Ok(*token),
        _ => Err(Error::unauthenticated("authorization header must be 'Bearer <token>'")),
    }
}

#[derive(Debug, Clone)]
pub struct AccessGate<V> {
    validator: V,
}

impl<V> AccessGate<V>
where
    V: AccessTokenValidator,
{
    pub fn new(validator: V) -> Self {
        Self { validator }
    }

    /// Admit or reject a call given its metadata.
    ///
    /// Entry point for map-based transports. A missing map, a missing
    /// `authorization` key and a malformed value are all `Unauthenticated`.
    pub fn check(&self, metadata: Option<&Metadata>) -> CoreResult<()> {
        let metadata = metadata.ok_or_else(|| Error::unauthenticated("request metadata missing"))?;
        self.check_header(metadata.get(AUTHORIZATION))
    }

    /// Admit or reject a call given its raw `Authorization` value.
    pub fn check_header(&self, header: Option<&str>) -> CoreResult<()> {
        let header = header
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::unauthenticated("authorization header missing"))?;
        let token = extract_bearer(header)?;

        match self.validator.validate_access_token(token) {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::unauthenticated("access token rejected")),
            Err(e) if e.kind() == ErrorKind::Unauthenticated => Err(e),
            Err(e) => Err(Error::unauthenticated(e.to_string())),
        }
    }
}
