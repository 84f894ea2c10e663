//! Configuration for the tool kernel.
//!
//! Settings are read from the environment exactly once at startup into an
//! immutable [`KernelConfig`], which is then passed explicitly to every
//! component that needs it.

#![warn(missing_docs, clippy::pedantic)]

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Toggles auth enforcement.
pub const AUTH_ENABLED: &str = "KERNEL_AUTH_ENABLED";
/// Toggles audit writes.
pub const AUDIT_ENABLED: &str = "KERNEL_AUDIT_ENABLED";
/// Directory for day-partitioned audit files.
pub const AUDIT_PATH: &str = "KERNEL_AUDIT_PATH";
/// Makes audit write failures fail the call.
pub const AUDIT_FAIL_CLOSED: &str = "KERNEL_AUDIT_FAIL_CLOSED";
/// Attempts per call, including the first.
pub const RETRY_MAX_ATTEMPTS: &str = "KERNEL_RETRY_MAX_ATTEMPTS";
/// Delay before the first retry.
pub const RETRY_INITIAL_BACKOFF_MS: &str = "KERNEL_RETRY_INITIAL_BACKOFF_MS";
/// Upper bound on any single retry delay.
pub const RETRY_MAX_BACKOFF_MS: &str = "KERNEL_RETRY_MAX_BACKOFF_MS";
/// Per-attempt handler timeout; `0` disables it.
pub const TOOL_TIMEOUT_MS: &str = "KERNEL_TOOL_TIMEOUT_MS";
/// Emits logs as JSON.
pub const LOG_JSON: &str = "KERNEL_LOG_JSON";

const DEFAULT_AUDIT_PATH: &str = "data/audit";

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A boolean option held something other than `true` or `false`.
    #[error("{key} must be `true` or `false`, got `{value}`")]
    InvalidBool {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
    /// A numeric option did not parse.
    #[error("{key} must be a non-negative integer, got `{value}`")]
    InvalidNumber {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },
    /// A value parsed but is out of range.
    #[error("invalid {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Retry knobs for the resilience middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetrySettings {
    /// Attempts per call, including the first. Always at least one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Per-attempt timeout, if any.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            attempt_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Immutable kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelConfig {
    auth_enabled: bool,
    audit_enabled: bool,
    audit_path: PathBuf,
    audit_fail_closed: bool,
    retry: RetrySettings,
    log_json: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            auth_enabled: false,
            audit_enabled: true,
            audit_path: PathBuf::from(DEFAULT_AUDIT_PATH),
            audit_fail_closed: false,
            retry: RetrySettings::default(),
            log_json: false,
        }
    }
}

impl KernelConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a recognized variable holds an invalid
    /// value.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup. Unset and empty
    /// values fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a recognized key holds an invalid value.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let max_attempts = parse_number(RETRY_MAX_ATTEMPTS, get(RETRY_MAX_ATTEMPTS))?
            .unwrap_or(u64::from(defaults.retry.max_attempts));
        let max_attempts = u32::try_from(max_attempts).map_err(|_| ConfigError::Invalid {
            key: RETRY_MAX_ATTEMPTS,
            reason: "too large",
        })?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: RETRY_MAX_ATTEMPTS,
                reason: "at least one attempt is required",
            });
        }

        let initial_backoff = parse_number(RETRY_INITIAL_BACKOFF_MS, get(RETRY_INITIAL_BACKOFF_MS))?
            .map_or(defaults.retry.initial_backoff, Duration::from_millis);
        let max_backoff = parse_number(RETRY_MAX_BACKOFF_MS, get(RETRY_MAX_BACKOFF_MS))?
            .map_or(defaults.retry.max_backoff, Duration::from_millis);
        let attempt_timeout = match parse_number(TOOL_TIMEOUT_MS, get(TOOL_TIMEOUT_MS))? {
            None => defaults.retry.attempt_timeout,
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        };

        let config = Self {
            auth_enabled: parse_bool(AUTH_ENABLED, get(AUTH_ENABLED))?
                .unwrap_or(defaults.auth_enabled),
            audit_enabled: parse_bool(AUDIT_ENABLED, get(AUDIT_ENABLED))?
                .unwrap_or(defaults.audit_enabled),
            audit_path: get(AUDIT_PATH).map_or(defaults.audit_path, PathBuf::from),
            audit_fail_closed: parse_bool(AUDIT_FAIL_CLOSED, get(AUDIT_FAIL_CLOSED))?
                .unwrap_or(defaults.audit_fail_closed),
            retry: RetrySettings {
                max_attempts,
                initial_backoff,
                max_backoff: max_backoff.max(initial_backoff),
                attempt_timeout,
            },
            log_json: parse_bool(LOG_JSON, get(LOG_JSON))?.unwrap_or(defaults.log_json),
        };

        debug!(?config, "kernel configuration loaded");
        Ok(config)
    }

    /// Returns whether auth enforcement is on.
    #[must_use]
    pub const fn auth_enabled(&self) -> bool {
        self.auth_enabled
    }

    /// Returns whether audit entries are written.
    #[must_use]
    pub const fn audit_enabled(&self) -> bool {
        self.audit_enabled
    }

    /// Returns the audit directory.
    #[must_use]
    pub fn audit_path(&self) -> &Path {
        &self.audit_path
    }

    /// Returns whether audit write failures fail the call.
    #[must_use]
    pub const fn audit_fail_closed(&self) -> bool {
        self.audit_fail_closed
    }

    /// Returns the retry settings.
    #[must_use]
    pub const fn retry(&self) -> RetrySettings {
        self.retry
    }

    /// Returns whether logs are emitted as JSON.
    #[must_use]
    pub const fn log_json(&self) -> bool {
        self.log_json
    }

    /// Overrides auth enforcement.
    #[must_use]
    pub fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    /// Overrides audit writes.
    #[must_use]
    pub fn with_audit_enabled(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    /// Overrides the audit directory.
    #[must_use]
    pub fn with_audit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_path = path.into();
        self
    }

    /// Overrides audit failure handling.
    #[must_use]
    pub fn with_audit_fail_closed(mut self, fail_closed: bool) -> Self {
        self.audit_fail_closed = fail_closed;
        self
    }

    /// Overrides the retry settings.
    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }
}

fn parse_bool(key: &'static str, raw: Option<String>) -> ConfigResult<Option<bool>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(Some(true)),
        "false" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidBool { key, value: raw }),
    }
}

fn parse_number(key: &'static str, raw: Option<String>) -> ConfigResult<Option<u64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    u64::from_str(raw.trim())
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber { key, value: raw })
}
