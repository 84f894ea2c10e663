//! Structured failures returned to callers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No tool is registered under the requested name.
    NotFound,
    /// The caller lacks the permission the tool requires, or the backend
    /// refused the operation.
    AuthDenied,
    /// The backend rejected the arguments.
    ValidationError,
    /// A timeout or connection failure on a tool that is not retried.
    TransientError,
    /// A transient failure persisted through every allowed attempt.
    RetryExhausted,
    /// Anything unexpected.
    InternalError,
}

impl ErrorKind {
    /// Returns the wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AuthDenied => "auth_denied",
            Self::ValidationError => "validation_error",
            Self::TransientError => "transient_error",
            Self::RetryExhausted => "retry_exhausted",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by [`KernelExecutor`](crate::KernelExecutor).
///
/// Carries a message only, never a backtrace or the raw arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} calling `{tool_name}`: {message}")]
#[serde(rename_all = "camelCase")]
pub struct KernelError {
    kind: ErrorKind,
    message: String,
    tool_name: String,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attempts: Option<u32>,
}

impl KernelError {
    /// Creates an error stamped with the current time.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tool_name: tool_name.into(),
            timestamp: Utc::now(),
            attempts: None,
        }
    }

    /// Records how many times the backend was invoked.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    /// Returns the category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the tool the caller asked for.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns when the failure was produced.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the backend attempt count, when the backend ran.
    #[must_use]
    pub const fn attempts(&self) -> Option<u32> {
        self.attempts
    }
}

/// Result alias for kernel calls.
pub type KernelResult<T> = Result<T, KernelError>;
