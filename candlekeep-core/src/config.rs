//! Run configuration.
//!
//! [`IngestConfig`] is the immutable value the fetcher and ingestion loop are
//! built with. [`Settings`] is its on-disk TOML form plus storage options;
//! command-line flags are applied on top of it before conversion.

use crate::error::ConfigError;
use crate::ingest::cursor::parse_iso8601;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 2017-01-01T00:00:00Z, where ingestion starts for an empty store.
pub const DEFAULT_SINCE_MILLIS: i64 = 1_483_228_800_000;

/// Smallest usable page: the bar at the cursor plus at least one newer bar.
pub const MIN_PAGE_LIMIT: u32 = 2;

/// Whether the loop stops once caught up or keeps tailing new bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    OneShot,
    Continuous,
}

/// Bounded fixed-cooldown retry budget for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt; `N` allows `N + 1` calls.
    pub max_retries: u32,
    /// Wait before each retry.
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Immutable configuration for one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Delay before every provider call.
    pub request_delay: Duration,
    pub retry: RetryPolicy,
    pub mode: RunMode,
    /// Cursor used when neither a start time nor stored data exists.
    pub default_since: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            request_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
            mode: RunMode::OneShot,
            default_since: DEFAULT_SINCE_MILLIS,
        }
    }
}

impl IngestConfig {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Pace requests at the provider's advertised limit plus `surcharge_pct` percent.
    pub fn with_rate_limit(mut self, advertised: Duration, surcharge_pct: u32) -> Self {
        self.request_delay = advertised * (100 + surcharge_pct) / 100;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_default_since(mut self, millis: i64) -> Self {
        self.default_since = millis;
        self
    }
}

/// Retry section of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub cooldown_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            cooldown_secs: policy.cooldown.as_secs(),
        }
    }
}

/// Settings file (`candlekeep.toml`). Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Root directory for store files.
    pub data_dir: PathBuf,
    /// ISO 8601 start used for an empty store.
    pub default_since: String,
    /// Extra percentage added to the provider's advertised rate limit.
    pub rate_limit_surcharge_pct: u32,
    /// Bars requested per page.
    pub page_limit: u32,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            default_since: "2017-01-01T00:00:00Z".to_string(),
            rate_limit_surcharge_pct: 0,
            page_limit: 1000,
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Load and validate a TOML settings file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SettingsFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::InvalidSettings(reason) => ConfigError::SettingsFile {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            toml::from_str(content).map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_limit < MIN_PAGE_LIMIT {
            return Err(ConfigError::InvalidSettings(format!(
                "page_limit must be at least {MIN_PAGE_LIMIT}, got {}",
                self.page_limit
            )));
        }
        if self.rate_limit_surcharge_pct > 1000 {
            return Err(ConfigError::InvalidSettings(format!(
                "rate_limit_surcharge_pct {} is above 1000",
                self.rate_limit_surcharge_pct
            )));
        }
        self.default_since_millis()?;
        Ok(())
    }

    pub fn default_since_millis(&self) -> Result<i64, ConfigError> {
        parse_iso8601(&self.default_since).ok_or_else(|| {
            ConfigError::InvalidSettings(format!(
                "default_since '{}' is not an ISO 8601 time",
                self.default_since
            ))
        })
    }

    /// Build the run configuration for a provider advertising `advertised` spacing.
    pub fn ingest_config(&self, mode: RunMode, advertised: Duration) -> Result<IngestConfig, ConfigError> {
        Ok(IngestConfig::new(mode)
            .with_rate_limit(advertised, self.rate_limit_surcharge_pct)
            .with_retry(RetryPolicy {
                max_retries: self.retry.max_retries,
                cooldown: Duration::from_secs(self.retry.cooldown_secs),
            })
            .with_default_since(self.default_since_millis()?))
    }
}
