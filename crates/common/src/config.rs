use anyhow::{Context, Result};
use serde::Deserialize;

// Default constants
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_CACHE_SIZE: usize = 0;

/// Retry policy for remote calls.
///
/// `quiet` suppresses the per-retry warning; the terminal error is always
/// logged regardless.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub quiet: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_delay_ms: default_max_delay_ms(),
            quiet: false,
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

/// Query cache policy. Size 0 disables caching; `clear` forces an
/// invalidation when the settings are applied.
#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct CacheSettings {
    #[serde(default = "default_cache_size")]
    pub size: usize,
    #[serde(default)]
    pub clear: bool,
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

/// Top-level driver configuration.
///
/// Repeated queries can stay cached for the lifetime of the process; the
/// cache never expires entries based on data freshness. A cached hit can
/// therefore serve results that predate mutations of the underlying
/// tables; that is a documented trade-off of enabling the cache, not a
/// defect.
#[derive(Debug, Deserialize, Clone)]
pub struct DriverConfig {
    /// Storage-sink URI prefix where query results are written
    pub output_location: String,

    /// Default database/schema applied when a query does not qualify names
    #[serde(default)]
    pub database: Option<String>,

    /// Interval between remote status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub cache: CacheSettings,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl DriverConfig {
    /// Build a configuration with defaults for everything except the
    /// output location, which has no sensible default.
    pub fn new(output_location: impl Into<String>) -> Self {
        Self {
            output_location: output_location.into(),
            database: None,
            poll_interval_ms: default_poll_interval_ms(),
            retry: RetrySettings::default(),
            cache: CacheSettings::default(),
        }
    }

    /// Load configuration from an optional file plus `NOCTUA`-prefixed
    /// environment variables (e.g. `NOCTUA_RETRY__MAX_ATTEMPTS`).
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if std::path::Path::new(path).exists() {
            builder.add_source(config::File::with_name(path))
        } else {
            builder
        };

        let builder = builder.add_source(
            config::Environment::with_prefix("NOCTUA")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().context("Failed to build configuration")?;

        let driver_config: DriverConfig = cfg
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        if driver_config.output_location.is_empty() {
            anyhow::bail!("Configuration is missing a non-empty output_location");
        }

        Ok(driver_config)
    }
}
