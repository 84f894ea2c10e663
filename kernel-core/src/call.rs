//! Tool call execution pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use kernel_audit::{AuditEntry, AuditError, AuditFailure, AuditFailureMode, AuditLog};
use kernel_config::KernelConfig;
use kernel_policy::{Authorizer, RbacAuthorizer};
use kernel_primitives::{Permission, UserIdentity};
use kernel_tools::{ToolError, ToolRegistry};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, KernelError, KernelResult};
use crate::invocation::{Invocation, InvocationEvent};
use crate::output::{DetailLevel, shape};
use crate::resilience::{ErrorClass, ExecutionFailure, Resilience, RetryPolicy};

/// Mediates every call from an orchestrator to a registered tool.
///
/// Each call is resolved, authorized, audited, run under the retry policy,
/// audited again, and finally shaped to the requested detail level. Calls
/// are independent; the executor holds no per-call state.
#[derive(Clone)]
pub struct KernelExecutor {
    registry: Arc<ToolRegistry>,
    authorizer: Arc<dyn Authorizer>,
    audit: Arc<AuditLog>,
    resilience: Resilience,
}

impl fmt::Debug for KernelExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelExecutor")
            .field("tools", &self.registry.len())
            .field("audit", &self.audit)
            .field("retry", self.resilience.policy())
            .finish_non_exhaustive()
    }
}

impl KernelExecutor {
    /// Creates an executor from explicit collaborators.
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        authorizer: Arc<dyn Authorizer>,
        audit: AuditLog,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            authorizer,
            audit: Arc::new(audit),
            resilience: Resilience::new(retry),
        }
    }

    /// Creates an executor with the standard role table and rule chain,
    /// day-file auditing, and retry settings taken from `config`.
    #[must_use]
    pub fn from_config(config: &KernelConfig, registry: Arc<ToolRegistry>) -> Self {
        let audit = if config.audit_enabled() {
            let mode = if config.audit_fail_closed() {
                AuditFailureMode::FailClosed
            } else {
                AuditFailureMode::FailOpen
            };
            AuditLog::daily_files(config.audit_path(), mode)
        } else {
            AuditLog::disabled()
        };

        info!(
            auth_enabled = config.auth_enabled(),
            audit_enabled = config.audit_enabled(),
            audit_path = %config.audit_path().display(),
            tools = registry.len(),
            "kernel executor configured"
        );

        Self::new(
            registry,
            Arc::new(RbacAuthorizer::standard(config.auth_enabled())),
            audit,
            RetryPolicy::from(config.retry()),
        )
    }

    /// Returns the tool registry.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Returns the audit log.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        self.resilience.policy()
    }

    /// Returns the permission `tool_name` requires.
    #[must_use]
    pub fn required_permission(&self, tool_name: &str) -> Permission {
        self.authorizer.required_permission(tool_name)
    }

    /// Returns every permission `identity` holds.
    #[must_use]
    pub fn effective_permissions(&self, identity: &UserIdentity) -> BTreeSet<Permission> {
        self.authorizer.effective_permissions(identity)
    }

    /// Calls a tool and returns its result at [`DetailLevel::Standard`].
    ///
    /// # Errors
    ///
    /// See [`call_tool_with_detail`](Self::call_tool_with_detail).
    pub async fn call_tool(
        &self,
        tool_name: &str,
        args: Value,
        identity: &UserIdentity,
    ) -> KernelResult<Value> {
        self.call_tool_with_detail(tool_name, args, identity, DetailLevel::default())
            .await
    }

    /// Calls a tool and returns its result shaped to `detail`.
    ///
    /// # Errors
    ///
    /// Returns a [`KernelError`] whose kind says why the call failed:
    /// unknown tool, missing permission, rejected arguments, transient
    /// failure on a tool that is not retried, retries exhausted, or an
    /// unexpected failure (including a fail-closed audit write).
    pub async fn call_tool_with_detail(
        &self,
        tool_name: &str,
        args: Value,
        identity: &UserIdentity,
        detail: DetailLevel,
    ) -> KernelResult<Value> {
        let mut invocation = Invocation::new(tool_name);
        advance(&mut invocation, InvocationEvent::Begin);

        let Some(handle) = self.registry.get(tool_name) else {
            advance(&mut invocation, InvocationEvent::Missing);
            let error = KernelError::new(
                ErrorKind::NotFound,
                format!("tool `{tool_name}` is not registered"),
                tool_name,
            );
            self.record_after_failure(&AuditEntry::not_found(tool_name, &args, identity))
                .await;
            debug!(tool = tool_name, user_id = identity.user_id(), "tool not found");
            return Err(error);
        };
        advance(&mut invocation, InvocationEvent::Found);

        let auth = self.authorizer.check(tool_name, identity);
        if !auth.is_allowed() {
            advance(&mut invocation, InvocationEvent::Deny);
            let reason = auth.reason().unwrap_or("permission denied");
            self.record_after_failure(&AuditEntry::denied(tool_name, &args, identity, reason))
                .await;
            info!(tool = tool_name, user_id = identity.user_id(), role = %identity.role(), reason, "tool call denied");
            return Err(KernelError::new(ErrorKind::AuthDenied, reason, tool_name));
        }
        advance(&mut invocation, InvocationEvent::Allow);

        if let Err(err) = self
            .audit
            .record(&AuditEntry::request(tool_name, &args, identity))
            .await
        {
            advance(&mut invocation, InvocationEvent::Fail);
            return Err(map_audit_error(tool_name, &err));
        }

        advance(&mut invocation, InvocationEvent::Start);
        let execution = self
            .resilience
            .execute_observed(&handle, &args, |_, _| {
                advance(&mut invocation, InvocationEvent::RetryScheduled);
                advance(&mut invocation, InvocationEvent::Start);
            })
            .await;

        match execution.result {
            Ok(output) => {
                let entry = AuditEntry::response(
                    tool_name,
                    &args,
                    identity,
                    execution.duration,
                    execution.attempts,
                );
                if let Err(err) = self.audit.record(&entry).await {
                    advance(&mut invocation, InvocationEvent::Fail);
                    return Err(map_audit_error(tool_name, &err).with_attempts(execution.attempts));
                }
                advance(&mut invocation, InvocationEvent::Succeed);
                info!(
                    tool = tool_name,
                    user_id = identity.user_id(),
                    attempts = execution.attempts,
                    duration_ms = entry.duration_ms(),
                    "tool call succeeded"
                );
                Ok(shape(&output, detail))
            }
            Err(failure) => {
                advance(&mut invocation, InvocationEvent::Fail);
                let error = map_execution_failure(tool_name, &failure, execution.attempts);
                let entry = AuditEntry::error(
                    tool_name,
                    &args,
                    identity,
                    execution.duration,
                    execution.attempts,
                    AuditFailure {
                        kind: error.kind().as_str().to_owned(),
                        message: error.message().to_owned(),
                    },
                );
                self.record_after_failure(&entry).await;
                warn!(
                    tool = tool_name,
                    user_id = identity.user_id(),
                    kind = %error.kind(),
                    attempts = execution.attempts,
                    "tool call failed"
                );
                Err(error)
            }
        }
    }

    /// Records the entry of a call that is already failing. A fail-closed
    /// write error cannot make the outcome worse, so it is only logged.
    async fn record_after_failure(&self, entry: &AuditEntry) {
        if let Err(err) = self.audit.record(entry).await {
            debug!(tool = entry.tool(), error = %err, "audit write failed for failed call");
        }
    }
}

fn advance(invocation: &mut Invocation, event: InvocationEvent) {
    if let Err(err) = invocation.transition(event) {
        warn!(error = %err, "invocation state machine rejected event");
    }
}

fn map_audit_error(tool_name: &str, err: &AuditError) -> KernelError {
    KernelError::new(
        ErrorKind::InternalError,
        format!("audit write failed: {err}"),
        tool_name,
    )
}

fn map_execution_failure(tool_name: &str, failure: &ExecutionFailure, attempts: u32) -> KernelError {
    let kind = match failure.class {
        ErrorClass::Transient if failure.exhausted => ErrorKind::RetryExhausted,
        ErrorClass::Transient => ErrorKind::TransientError,
        ErrorClass::Denied => ErrorKind::AuthDenied,
        ErrorClass::Permanent => match failure.error {
            ToolError::Validation { .. } => ErrorKind::ValidationError,
            _ => ErrorKind::InternalError,
        },
    };
    let message = if failure.exhausted {
        format!("gave up after {attempts} attempts: {}", failure.error)
    } else {
        failure.error.to_string()
    };
    KernelError::new(kind, message, tool_name).with_attempts(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kernel_audit::{AuditAction, AuditResult, AuditSink, MemorySink, REDACTED};
    use kernel_primitives::Role;
    use kernel_tools::{ToolClassification, ToolDescriptor};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Harness {
        executor: KernelExecutor,
        sink: Arc<MemorySink>,
        calls: Arc<AtomicU32>,
    }

    fn harness(auth_enabled: bool) -> Harness {
        harness_with(auth_enabled, AuditFailureMode::FailOpen, None)
    }

    fn harness_with(
        auth_enabled: bool,
        mode: AuditFailureMode,
        sink_override: Option<Arc<dyn AuditSink>>,
    ) -> Harness {
        let calls = Arc::new(AtomicU32::new(0));
        let mut builder = ToolRegistry::builder();

        let counter = Arc::clone(&calls);
        builder
            .register(
                ToolDescriptor::new("geowiz.parse_las_file", ToolClassification::Query).unwrap(),
                move |args: Value| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(json!({ "curves": ["GR", "RHOB"], "echo": args })) }
                },
            )
            .unwrap();

        let counter = Arc::clone(&calls);
        builder
            .register(
                ToolDescriptor::new(
                    "decision.make_investment_decision",
                    ToolClassification::Command,
                )
                .unwrap(),
                move |_: Value| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(json!({ "decision": "drill" })) }
                },
            )
            .unwrap();

        let counter = Arc::clone(&calls);
        builder
            .register(
                ToolDescriptor::new("econobot.fetch_prices", ToolClassification::Query).unwrap(),
                move |_: Value| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Err(ToolError::connection("price feed unreachable")) }
                },
            )
            .unwrap();

        let counter = Arc::clone(&calls);
        builder
            .register(
                ToolDescriptor::new("econobot.npv", ToolClassification::Query).unwrap(),
                move |_: Value| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Err(ToolError::validation("discount rate must be positive")) }
                },
            )
            .unwrap();

        let counter = Arc::clone(&calls);
        builder
            .register(
                ToolDescriptor::new("reporter.publish", ToolClassification::Command).unwrap(),
                move |_: Value| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async move { Err(ToolError::timeout("renderer busy")) }
                },
            )
            .unwrap();

        let sink = Arc::new(MemorySink::new());
        let audit_sink: Arc<dyn AuditSink> = sink_override.unwrap_or_else(|| Arc::clone(&sink) as Arc<dyn AuditSink>);
        let executor = KernelExecutor::new(
            Arc::new(builder.build()),
            Arc::new(RbacAuthorizer::standard(auth_enabled)),
            AuditLog::new(audit_sink, mode),
            RetryPolicy::new(3, Duration::from_millis(1)).with_max_backoff(Duration::from_millis(2)),
        );
        Harness {
            executor,
            sink,
            calls,
        }
    }

    fn identity(role: Role) -> UserIdentity {
        UserIdentity::builder("user-7", role).build().unwrap()
    }

    #[tokio::test]
    async fn analyst_is_denied_decision_tools() {
        let h = harness(true);
        let err = h
            .executor
            .call_tool(
                "decision.make_investment_decision",
                json!({ "prospect": "A-12" }),
                &identity(Role::Analyst),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthDenied);
        assert!(err.message().contains("executive"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);

        let entries = h.sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action(), AuditAction::Denied);
        assert!(entries[0].reason().unwrap().contains("execute:decisions"));
    }

    #[tokio::test]
    async fn admin_may_call_everything_registered() {
        let h = harness(true);
        let admin = identity(Role::Admin);
        for tool in ["geowiz.parse_las_file", "decision.make_investment_decision"] {
            h.executor.call_tool(tool, json!({}), &admin).await.unwrap();
        }
        assert_eq!(h.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_auth_lets_engineer_decide() {
        let h = harness(false);
        let output = h
            .executor
            .call_tool(
                "decision.make_investment_decision",
                json!({}),
                &identity(Role::Engineer),
            )
            .await
            .unwrap();
        assert_eq!(output["decision"], "drill");
    }

    #[tokio::test]
    async fn success_writes_request_then_response() {
        let h = harness(true);
        let output = h
            .executor
            .call_tool(
                "geowiz.parse_las_file",
                json!({ "file": "well.las", "apiKey": "abc123" }),
                &identity(Role::Analyst),
            )
            .await
            .unwrap();
        assert_eq!(output["curves"], json!(["GR", "RHOB"]));

        let entries = h.sink.entries();
        let actions: Vec<_> = entries.iter().map(AuditEntry::action).collect();
        assert_eq!(actions, [AuditAction::Request, AuditAction::Response]);
        for entry in &entries {
            assert_eq!(entry.parameters()["apiKey"], REDACTED);
            assert_eq!(entry.parameters()["file"], "well.las");
        }
        assert!(entries[1].success());
        assert_eq!(entries[1].attempts(), Some(1));
        assert!(entries[1].duration_ms().is_some());
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found_and_audited_once() {
        let h = harness(true);
        let err = h
            .executor
            .call_tool("seismic.migrate", json!({}), &identity(Role::Admin))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        let entries = h.sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action(), AuditAction::NotFound);
    }

    #[tokio::test]
    async fn transient_query_failure_exhausts_retries() {
        let h = harness(true);
        let err = h
            .executor
            .call_tool("econobot.fetch_prices", json!({}), &identity(Role::Analyst))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RetryExhausted);
        assert_eq!(err.attempts(), Some(3));
        assert_eq!(h.calls.load(Ordering::SeqCst), 3);

        let entries = h.sink.entries();
        assert_eq!(entries.len(), 2);
        let terminal = &entries[1];
        assert_eq!(terminal.action(), AuditAction::Error);
        assert!(!terminal.success());
        assert_eq!(terminal.attempts(), Some(3));
        assert_eq!(terminal.failure().unwrap().kind, "retry_exhausted");
    }

    #[tokio::test]
    async fn validation_failure_is_immediate() {
        let h = harness(true);
        let err = h
            .executor
            .call_tool("econobot.npv", json!({ "rate": -1 }), &identity(Role::Analyst))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(err.attempts(), Some(1));
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_command_failure_is_not_retried() {
        let h = harness(false);
        let err = h
            .executor
            .call_tool("reporter.publish", json!({}), &identity(Role::Engineer))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TransientError);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn detail_level_shapes_output() {
        let h = harness(false);
        let output = h
            .executor
            .call_tool_with_detail(
                "geowiz.parse_las_file",
                json!({ "file": "well.las" }),
                &identity(Role::Analyst),
                DetailLevel::Minimal,
            )
            .await
            .unwrap();
        assert_eq!(output["curves"], "[2 items]");
        assert_eq!(output["echo"], "{1 fields}");
    }

    #[tokio::test]
    async fn introspection_matches_policy() {
        let h = harness(true);
        assert_eq!(
            h.executor.required_permission("geowiz.parse_las_file"),
            Permission::ReadAnalysis
        );
        assert_eq!(
            h.executor.required_permission("decision.approve"),
            Permission::ExecuteDecisions
        );
        let perms = h.executor.effective_permissions(&identity(Role::Engineer));
        assert!(perms.contains(&Permission::WriteReports));
        assert!(!perms.contains(&Permission::ExecuteDecisions));
    }

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn append(&self, _entry: &AuditEntry) -> AuditResult<()> {
            Err(std::io::Error::other("disk full").into())
        }
    }

    #[tokio::test]
    async fn audit_failure_is_swallowed_when_fail_open() {
        let h = harness_with(false, AuditFailureMode::FailOpen, Some(Arc::new(BrokenSink)));
        h.executor
            .call_tool("geowiz.parse_las_file", json!({}), &identity(Role::Analyst))
            .await
            .unwrap();
        assert_eq!(h.executor.audit().failure_count(), 2);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn audit_failure_aborts_before_backend_when_fail_closed() {
        let h = harness_with(false, AuditFailureMode::FailClosed, Some(Arc::new(BrokenSink)));
        let err = h
            .executor
            .call_tool("geowiz.parse_las_file", json!({}), &identity(Role::Analyst))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalError);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }
}
