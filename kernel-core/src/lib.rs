//! Tool-invocation kernel.
//!
//! [`KernelExecutor`] is the single entry point orchestrators use to reach a
//! backend tool. Around every call it composes registry lookup, role-based
//! authorization, redacted auditing, bounded retry of transient failures,
//! and detail-level shaping of the result.

#![warn(missing_docs, clippy::pedantic)]

mod call;
mod error;
mod invocation;
mod output;
mod resilience;

pub use call::KernelExecutor;
pub use error::{ErrorKind, KernelError, KernelResult};
pub use invocation::{
    Invocation, InvocationError, InvocationEvent, InvocationResult, InvocationState,
};
pub use output::{
    DetailLevel, MINIMAL_MAX_STRING_CHARS, OutputError, STANDARD_MAX_ARRAY_ITEMS,
    STANDARD_MAX_STRING_CHARS, shape,
};
pub use resilience::{
    ErrorClass, Execution, ExecutionFailure, Resilience, RetryPolicy, RetryState, classify,
};
