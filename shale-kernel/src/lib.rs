//! Tool-invocation kernel facade.
//!
//! Bundles the kernel crates behind feature flags so embedders can pull in
//! only the pieces they need. With default features, build a
//! [`tools::ToolRegistry`], load a [`config::KernelConfig`], and hand both to
//! [`kernel::KernelExecutor::from_config`].

#![warn(missing_docs, clippy::pedantic)]

/// Identities, roles, and permission tags.
pub use kernel_primitives as primitives;

/// Call pipeline and executor (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use kernel_core as kernel;

/// Role table, permission rules, and auth middleware (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use kernel_policy as policy;

/// Redacted audit trail (enabled by `audit` feature).
#[cfg(feature = "audit")]
pub use kernel_audit as audit;

/// Tool registry (enabled by `tools` feature).
#[cfg(feature = "tools")]
pub use kernel_tools as tools;

/// Startup configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use kernel_config as config;

/// Logging setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use kernel_telemetry as telemetry;
