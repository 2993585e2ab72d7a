use rating::config::UpstreamConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Worker pool {0} needs at least one worker")]
    EmptyPool(&'static str),

    #[error("Cache TTL cannot be 0")]
    InvalidCacheTtl,

    #[error("Request timeout cannot be 0")]
    InvalidRequestTimeout,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Worker counts of the two upstream pools
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolsConfig {
    pub roster_workers: usize,
    pub profile_workers: usize,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        PoolsConfig {
            roster_workers: 8,
            profile_workers: 8,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: 3600,
            max_capacity: 100_000,
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    /// Health and readiness endpoints; disabled when absent
    pub admin_listener: Option<Listener>,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub pools: PoolsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Deadline for one comrades computation, end to end
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How long in-flight requests get to finish on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        if let Some(admin_listener) = &self.admin_listener {
            admin_listener.validate()?;
        }

        if self.pools.roster_workers == 0 {
            return Err(ValidationError::EmptyPool("roster"));
        }
        if self.pools.profile_workers == 0 {
            return Err(ValidationError::EmptyPool("profile"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ValidationError::InvalidCacheTtl);
        }
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidRequestTimeout);
        }

        Ok(())
    }
}
