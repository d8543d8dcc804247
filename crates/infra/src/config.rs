//! Environment-based configuration.
//!
//! Every setting has a default except the signing secret, which is only
//! required by processes that issue or verify tokens
//! (see [`AuthConfig::validate`]).

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use userlink_auth::{HashCost, TokenSettings, check_ttl};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub secret_key: Option<String>,
    pub access_token_ttl: String,
    pub refresh_token_ttl: String,
    pub hash_cost: HashCost,
}

impl AuthConfig {
    /// Require the secret and reject unparsable TTLs before serving.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.secret_key.as_deref() {
            Some(s) if !s.is_empty() => {}
            _ => return Err(ConfigError::Missing("AUTH_SECRET_KEY")),
        }
        check_ttl(&self.access_token_ttl)
            .map_err(|e| ConfigError::invalid("AUTH_ACCESS_TOKEN_TTL", &self.access_token_ttl, e))?;
        check_ttl(&self.refresh_token_ttl).map_err(|e| {
            ConfigError::invalid("AUTH_REFRESH_TOKEN_TTL", &self.refresh_token_ttl, e)
        })?;
        Ok(())
    }

    pub fn token_settings(&self) -> Result<TokenSettings, ConfigError> {
        self.validate()?;
        let secret = self.secret_key.clone().unwrap_or_default();
        Ok(TokenSettings::new(
            secret,
            self.access_token_ttl.clone(),
            self.refresh_token_ttl.clone(),
        ))
    }
}

impl core::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("hash_cost", &self.hash_cost)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub url: Option<String>,
    pub topic: String,
    pub group: String,
    /// Must stay the same across restarts so the consumer re-reads its own
    /// unacknowledged entries.
    pub consumer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationConfig {
    pub producer_tick: Duration,
    pub consumer_tick: Duration,
    pub connect_retry: Duration,
    /// 0 retries forever.
    pub connect_attempts: u32,
    /// Entries pending this long under another consumer name are claimed.
    pub claim_idle: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub auth: AuthConfig,
    pub database_url: Option<String>,
    pub replica_database_url: Option<String>,
    pub broker: BrokerConfig,
    pub replication: ReplicationConfig,
    pub bind_address: SocketAddr,
    pub replica_bind_address: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let defaults = HashCost::default();
        let auth = AuthConfig {
            secret_key: get("AUTH_SECRET_KEY"),
            access_token_ttl: or("AUTH_ACCESS_TOKEN_TTL", "15m"),
            refresh_token_ttl: or("AUTH_REFRESH_TOKEN_TTL", "720h"),
            hash_cost: HashCost {
                iterations: number(get("AUTH_HASH_ITERATIONS"), "AUTH_HASH_ITERATIONS", defaults.iterations)?,
                memory_kib: number(get("AUTH_HASH_MEMORY_KIB"), "AUTH_HASH_MEMORY_KIB", defaults.memory_kib)?,
            },
        };

        let broker = BrokerConfig {
            url: get("BROKER_URL"),
            topic: or("BROKER_TOPIC", "users.ids"),
            group: or("BROKER_GROUP", "replica"),
            consumer: or("BROKER_CONSUMER", "replica-consumer"),
        };

        let replication = ReplicationConfig {
            producer_tick: duration(get("PRODUCER_TICK"), "PRODUCER_TICK", "5s")?,
            consumer_tick: duration(get("CONSUMER_TICK"), "CONSUMER_TICK", "5s")?,
            connect_retry: duration(get("CONSUMER_CONNECT_RETRY"), "CONSUMER_CONNECT_RETRY", "10s")?,
            connect_attempts: number(get("CONSUMER_CONNECT_ATTEMPTS"), "CONSUMER_CONNECT_ATTEMPTS", 30)?,
            claim_idle: duration(get("CONSUMER_CLAIM_IDLE"), "CONSUMER_CLAIM_IDLE", "60s")?,
        };

        Ok(Self {
            auth,
            database_url: get("DATABASE_URL"),
            replica_database_url: get("REPLICA_DATABASE_URL"),
            broker,
            replication,
            bind_address: address(get("BIND_ADDRESS"), "BIND_ADDRESS", "0.0.0.0:8080")?,
            replica_bind_address: address(
                get("REPLICA_BIND_ADDRESS"),
                "REPLICA_BIND_ADDRESS",
                "0.0.0.0:8081",
            )?,
        })
    }
}

fn number(raw: Option<String>, key: &'static str, default: u32) -> Result<u32, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e| ConfigError::invalid(key, &v, e)),
    }
}

fn duration(raw: Option<String>, key: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let value = raw.unwrap_or_else(|| default.to_string());
    let parsed = humantime::parse_duration(&value).map_err(|e| ConfigError::invalid(key, &value, e))?;
    if parsed.is_zero() {
        return Err(ConfigError::invalid(key, &value, "must be greater than zero"));
    }
    Ok(parsed)
}

fn address(raw: Option<String>, key: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let value = raw.unwrap_or_else(|| default.to_string());
    value.parse().map_err(|e| ConfigError::invalid(key, &value, e))
}
