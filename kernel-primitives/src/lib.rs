//! Core shared types for the tool-invocation kernel.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod identity;
mod ids;
mod permission;

/// Error type and result alias shared across the kernel.
pub use error::{Error, Result};
/// Caller identity evaluated by the auth middleware.
pub use identity::{UserIdentity, UserIdentityBuilder};
/// Unique identifier for an authenticated session.
pub use ids::SessionId;
/// Closed sets of permission tags and roles.
pub use permission::{Permission, Role};
