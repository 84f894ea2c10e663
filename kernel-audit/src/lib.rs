//! Audit middleware for the tool kernel.
//!
//! Every invocation produces structured [`AuditEntry`] records whose
//! parameters are redacted at construction. Entries are appended to an
//! [`AuditSink`]; the default sink writes one JSON object per line into a
//! file per UTC day. [`AuditLog`] decides what happens when a write fails.

#![warn(missing_docs, clippy::pedantic)]

mod entry;
mod error;
mod log;
mod redact;
mod sink;

pub use entry::{AuditAction, AuditEntry, AuditFailure};
pub use error::{AuditError, AuditResult};
pub use log::{AuditFailureMode, AuditLog};
pub use redact::{REDACTED, is_sensitive_key, redact};
pub use sink::{AuditSink, DailyFileSink, MemorySink};
