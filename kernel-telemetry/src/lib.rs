//! Logging setup for kernel processes.
//!
//! Output goes to stderr, filtered by `RUST_LOG` (default `info`), either as
//! human-readable lines or as one JSON object per event.

#![warn(missing_docs, clippy::pedantic)]

use kernel_config::KernelConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The fallback filter directive did not parse.
    #[error("invalid log directive: {source}")]
    Directive {
        /// Parser error.
        #[from]
        source: ParseError,
    },
    /// A global subscriber is already installed.
    #[error("failed to install tracing subscriber: {source}")]
    Install {
        /// Underlying error.
        #[from]
        source: TryInitError,
    },
}

/// Logging options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Filter directive applied when `RUST_LOG` is absent.
    pub default_directive: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json: false,
            default_directive: DEFAULT_DIRECTIVE.to_owned(),
        }
    }
}

impl From<&KernelConfig> for TelemetryConfig {
    fn from(config: &KernelConfig) -> Self {
        Self {
            json: config.log_json(),
            ..Self::default()
        }
    }
}

impl TelemetryConfig {
    /// Builds the filter, preferring `RUST_LOG` over the default directive.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Directive`] when the default directive is
    /// malformed and `RUST_LOG` does not supply a usable one.
    pub fn env_filter(&self) -> Result<EnvFilter, TelemetryError> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.default_directive))?;
        Ok(filter)
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError`] when the filter is invalid or a subscriber is
/// already installed.
pub fn try_init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = config.env_filter()?;

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let console_layer =
        (!config.json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(console_layer)
        .try_init()?;
    Ok(())
}

/// Installs the global subscriber, ignoring an already-installed one.
pub fn init(config: &TelemetryConfig) {
    if let Err(err) = try_init(config) {
        tracing::debug!(error = %err, "tracing subscriber not installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_follows_kernel_config() {
        let config = KernelConfig::from_lookup(|key| {
            (key == kernel_config::LOG_JSON).then(|| "true".to_owned())
        })
        .unwrap();
        let telemetry = TelemetryConfig::from(&config);
        assert!(telemetry.json);
        assert_eq!(telemetry.default_directive, DEFAULT_DIRECTIVE);
    }

    #[test]
    fn second_install_is_rejected() {
        let config = TelemetryConfig::default();
        let _ = try_init(&config);
        assert!(matches!(
            try_init(&config),
            Err(TelemetryError::Install { .. })
        ));
    }
}
