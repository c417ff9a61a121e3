//! Node configuration.
//!
//! Loaded from an optional YAML file, then overridden by `QUILL__*`
//! environment variables (`QUILL__SERVER__LISTEN_ADDR=0.0.0.0:8080`,
//! `QUILL__SYNC__RETRY__MAX_ATTEMPTS=3`, ...), then validated.

use quill_sync::RetryPolicy;
use quill_vcs::MergeOptions;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "QUILL";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file or environment could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Configuration for a Quill node.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct Config {
    /// HTTP server.
    #[validate(nested)]
    pub server: ServerConfig,
    /// Log output.
    #[validate(nested)]
    pub logging: LoggingConfig,
    /// Diff and merge policy.
    pub merge: MergeOptions,
    /// Search index synchronization.
    #[validate(nested)]
    pub sync: SyncConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for Quill's own targets (trace, debug, info, warn, error).
    #[validate(custom(function = "validate_level"))]
    pub level: String,
    /// Emit JSON lines instead of pretty output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Search index synchronization settings.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the search service; the in-process index is used when unset.
    #[validate(url)]
    pub index_url: Option<String>,
    /// Interval between outbox polls when no change notification arrives.
    #[validate(range(min = 10, max = 3_600_000))]
    pub poll_interval_ms: u64,
    /// Outbox rows delivered per drain pass.
    #[validate(range(min = 1, max = 1000))]
    pub batch_size: usize,
    /// Per-request timeout towards the search service.
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
    /// Delivery retries.
    #[validate(nested)]
    pub retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            index_url: None,
            poll_interval_ms: 5_000,
            batch_size: quill_sync::DEFAULT_BATCH_SIZE,
            request_timeout_ms: 10_000,
            retry: RetryConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Delivery retry settings.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_delays"))]
pub struct RetryConfig {
    /// Attempts per outbox row before it is marked failed.
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay_ms: u64,
    /// Upper bound on any delay.
    pub max_delay_ms: u64,
    /// Backoff multiplier.
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,
    /// Add up to 25% random jitter.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }
}

impl RetryConfig {
    /// The retry policy these settings describe.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

impl Config {
    /// Loads configuration from `path` (if given and present) and the
    /// environment, then validates it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new("unknown_log_level")),
    }
}

fn validate_delays(retry: &RetryConfig) -> Result<(), ValidationError> {
    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ValidationError::new("max_delay_below_initial_delay"));
    }
    Ok(())
}
