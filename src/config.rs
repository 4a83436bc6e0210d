//! Retry configuration: the validated [`RetryConfig`] value and the serde
//! [`RetrySettings`] section host applications can embed in their own TOML.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rejected retry configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("base_delay ({base:?}) must not exceed max_delay ({max:?})")]
    BaseExceedsMax { base: Duration, max: Duration },
    #[error("{field} is not a valid number of seconds: {value}")]
    InvalidSeconds { field: &'static str, value: f64 },
    #[error("invalid retry settings: {0}")]
    Parse(String),
}

/// Immutable retry budget and backoff bounds.
///
/// Only constructible through [`RetryConfig::new`] (or the presets), so
/// `0 < base_delay <= max_delay` and `max_attempts >= 1` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    max_attempts: u32,
    max_elapsed_time: Duration,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_elapsed_time: Duration::from_secs(60),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(
        max_attempts: u32,
        max_elapsed_time: Duration,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        for (field, value) in [
            ("max_elapsed_time", max_elapsed_time),
            ("base_delay", base_delay),
            ("max_delay", max_delay),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }
        if base_delay > max_delay {
            return Err(ConfigError::BaseExceedsMax {
                base: base_delay,
                max: max_delay,
            });
        }
        Ok(Self {
            max_attempts,
            max_elapsed_time,
            base_delay,
            max_delay,
        })
    }

    /// Settings tuned for LLM APIs: 5 attempts within 120s, backoff from 2s up to 60s.
    pub fn llm() -> Self {
        Self {
            max_attempts: 5,
            max_elapsed_time: Duration::from_secs(120),
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }

    /// Parse a standalone TOML table of [`RetrySettings`].
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: RetrySettings =
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.into_config()
    }

    /// Maximum number of attempts (including the first).
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_elapsed_time(&self) -> Duration {
        self.max_elapsed_time
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

/// Retry parameters as they appear in a config file (`[retry]` table).
///
/// Durations are seconds; fractional values are allowed (e.g. 0.25 = 250ms).
/// Missing keys take the [`RetryConfig::default`] values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Total time budget across all attempts, in seconds.
    pub max_elapsed_secs: f64,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetrySettings {
    fn from(cfg: RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            max_elapsed_secs: cfg.max_elapsed_time.as_secs_f64(),
            base_delay_secs: cfg.base_delay.as_secs_f64(),
            max_delay_secs: cfg.max_delay.as_secs_f64(),
        }
    }
}

impl RetrySettings {
    /// Validate into a [`RetryConfig`].
    pub fn into_config(self) -> Result<RetryConfig, ConfigError> {
        RetryConfig::new(
            self.max_attempts,
            secs("max_elapsed_secs", self.max_elapsed_secs)?,
            secs("base_delay_secs", self.base_delay_secs)?,
            secs("max_delay_secs", self.max_delay_secs)?,
        )
    }
}

fn secs(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidSeconds { field, value })
}
