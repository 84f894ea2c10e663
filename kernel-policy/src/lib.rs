//! Access control for tool invocations.
//!
//! Roles map to permission sets through an explicit [`RoleTable`]; tool names
//! map to a single required permission through an ordered list of
//! [`PermissionRule`]s. [`RbacAuthorizer`] combines both into a pure check.

#![warn(missing_docs, clippy::pedantic)]

pub mod auth;
pub mod roles;
pub mod rules;

pub use auth::{AuthResult, Authorizer, RbacAuthorizer};
pub use roles::RoleTable;
pub use rules::{PermissionRule, PermissionRules, PolicyError, PolicyResult, ToolPattern};
