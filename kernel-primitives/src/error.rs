//! Shared error definitions for kernel primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the kernel.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided session identifier could not be parsed.
    #[error("invalid session id: {source}")]
    InvalidSessionId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Permission tag is not part of the closed permission set.
    #[error("unknown permission `{tag}`")]
    InvalidPermission {
        /// The offending tag.
        tag: String,
    },

    /// Role tag is not part of the closed role set.
    #[error("unknown role `{tag}`")]
    InvalidRole {
        /// The offending tag.
        tag: String,
    },

    /// Identity failed validation.
    #[error("invalid identity: {reason}")]
    InvalidIdentity {
        /// Human-readable reason for rejection.
        reason: String,
    },
}
