//! Failure classification and bounded retry around backend handlers.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use kernel_config::RetrySettings;
use kernel_tools::{ToolError, ToolHandle, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// How a handler failure is treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// May succeed if tried again.
    Transient,
    /// Will fail the same way every time.
    Permanent,
    /// The backend refused the operation.
    Denied,
}

/// Classifies a handler error. Anything not known to be transient or a
/// refusal is permanent.
#[must_use]
pub fn classify(error: &ToolError) -> ErrorClass {
    match error {
        ToolError::Timeout { .. } | ToolError::Connection { .. } => ErrorClass::Transient,
        ToolError::PermissionDenied { .. } => ErrorClass::Denied,
        ToolError::Validation { .. }
        | ToolError::InvalidDescriptor { .. }
        | ToolError::DuplicateTool { .. }
        | ToolError::UnknownTool { .. }
        | ToolError::Execution { .. } => ErrorClass::Permanent,
    }
}

/// Attempt bound and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: u32,
    max_backoff: Duration,
    attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Creates a policy doubling from `initial_backoff`. A zero attempt
    /// count is raised to one.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            ..Self::default()
        }
    }

    /// Sets the growth factor between delays. Zero is treated as one.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier.max(1);
        self
    }

    /// Caps any single delay.
    #[must_use]
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Bounds each attempt; `None` lets a handler run indefinitely.
    #[must_use]
    pub fn with_attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Returns the attempt bound, including the first attempt.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the growth factor.
    #[must_use]
    pub const fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Returns the delay cap.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(RetrySettings::default())
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: settings.initial_backoff,
            multiplier: 2,
            max_backoff: settings.max_backoff,
            attempt_timeout: settings.attempt_timeout,
        }
    }
}

/// Per-invocation retry bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    next_backoff: Duration,
}

impl RetryState {
    /// Starts before the first attempt.
    #[must_use]
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 0,
            next_backoff: policy.initial_backoff.min(policy.max_backoff),
        }
    }

    /// Returns how many attempts have started.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the delay the next retry will wait.
    #[must_use]
    pub const fn next_backoff(&self) -> Duration {
        self.next_backoff
    }

    fn begin_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Returns the delay to wait now and grows the following one.
    fn schedule_retry(&mut self, policy: &RetryPolicy) -> Duration {
        let delay = self.next_backoff;
        self.next_backoff = delay
            .saturating_mul(policy.multiplier)
            .min(policy.max_backoff);
        delay
    }
}

/// Terminal failure of a resilient execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionFailure {
    /// Error from the final attempt.
    pub error: ToolError,
    /// Classification of that error.
    pub class: ErrorClass,
    /// `true` when a retryable failure hit the attempt bound.
    pub exhausted: bool,
}

/// What happened when a handler was run under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Execution {
    /// Handler output or terminal failure.
    pub result: Result<Value, ExecutionFailure>,
    /// Number of attempts made.
    pub attempts: u32,
    /// Wall time of the final attempt.
    pub duration: Duration,
}

/// Runs handlers with timeouts, panic capture, and bounded retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resilience {
    policy: RetryPolicy,
}

impl Resilience {
    /// Creates the middleware with the supplied policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the active policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `handle` until it succeeds, fails permanently, or runs out of
    /// attempts.
    pub async fn execute(&self, handle: &ToolHandle, args: &Value) -> Execution {
        self.execute_observed(handle, args, |_, _| {}).await
    }

    /// Like [`execute`](Self::execute), calling `on_retry` before each
    /// backoff sleep with the updated state and the error being retried.
    pub async fn execute_observed<F>(
        &self,
        handle: &ToolHandle,
        args: &Value,
        mut on_retry: F,
    ) -> Execution
    where
        F: FnMut(&RetryState, &ToolError),
    {
        let descriptor = handle.descriptor();
        let retry_eligible = descriptor.classification().is_retry_eligible();
        let mut state = RetryState::new(&self.policy);

        loop {
            state.begin_attempt();
            let started = Instant::now();
            let outcome = self.attempt(handle, args).await;
            let duration = started.elapsed();

            let error = match outcome {
                Ok(value) => {
                    debug!(tool = descriptor.name(), attempt = state.attempt(), "attempt succeeded");
                    return Execution {
                        result: Ok(value),
                        attempts: state.attempt(),
                        duration,
                    };
                }
                Err(error) => error,
            };

            let class = classify(&error);
            let retryable = retry_eligible && class == ErrorClass::Transient;
            if retryable && state.attempt() < self.policy.max_attempts {
                let delay = state.schedule_retry(&self.policy);
                warn!(
                    tool = descriptor.name(),
                    attempt = state.attempt(),
                    backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %error,
                    "transient failure, retrying"
                );
                on_retry(&state, &error);
                tokio::time::sleep(delay).await;
                continue;
            }

            debug!(
                tool = descriptor.name(),
                attempt = state.attempt(),
                ?class,
                exhausted = retryable,
                "attempt failed terminally"
            );
            return Execution {
                result: Err(ExecutionFailure {
                    error,
                    class,
                    exhausted: retryable,
                }),
                attempts: state.attempt(),
                duration,
            };
        }
    }

    async fn attempt(&self, handle: &ToolHandle, args: &Value) -> ToolResult<Value> {
        let call = AssertUnwindSafe(handle.invoke(args.clone())).catch_unwind();
        let outcome = match self.policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(ToolError::timeout(format!(
                        "no response within {} ms",
                        limit.as_millis()
                    )));
                }
            },
            None => call.await,
        };

        outcome.unwrap_or_else(|_| Err(ToolError::execution("tool handler panicked")))
    }
}
