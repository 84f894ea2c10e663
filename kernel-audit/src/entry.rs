//! Audit record shape.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kernel_primitives::{Role, SessionId, UserIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::redact::redact;

/// Event an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Authorized call about to reach the backend.
    Request,
    /// Backend returned a result.
    Response,
    /// Backend failed terminally.
    Error,
    /// Auth middleware rejected the call.
    Denied,
    /// Tool name was not registered.
    NotFound,
}

impl AuditAction {
    /// Returns `true` for actions that end an invocation.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Request)
    }
}

/// Classification and message of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFailure {
    /// Error kind tag, e.g. `retry_exhausted`.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    timestamp: DateTime<Utc>,
    tool: String,
    action: AuditAction,
    parameters: Value,
    user_id: String,
    session_id: SessionId,
    role: Role,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<AuditFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attempts: Option<u32>,
}

impl AuditEntry {
    fn base(action: AuditAction, tool: &str, args: &Value, identity: &UserIdentity) -> Self {
        Self {
            timestamp: Utc::now(),
            tool: tool.to_owned(),
            action,
            parameters: redact(args),
            user_id: identity.user_id().to_owned(),
            session_id: identity.session_id(),
            role: identity.role(),
            success: false,
            duration_ms: None,
            error: None,
            reason: None,
            attempts: None,
        }
    }

    /// Record written once a call passes auth, before the backend runs.
    #[must_use]
    pub fn request(tool: &str, args: &Value, identity: &UserIdentity) -> Self {
        Self::base(AuditAction::Request, tool, args, identity)
    }

    /// Record written when the backend succeeds.
    #[must_use]
    pub fn response(
        tool: &str,
        args: &Value,
        identity: &UserIdentity,
        duration: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            success: true,
            duration_ms: Some(duration_millis(duration)),
            attempts: Some(attempts),
            ..Self::base(AuditAction::Response, tool, args, identity)
        }
    }

    /// Record written when the backend fails terminally.
    #[must_use]
    pub fn error(
        tool: &str,
        args: &Value,
        identity: &UserIdentity,
        duration: Duration,
        attempts: u32,
        failure: AuditFailure,
    ) -> Self {
        Self {
            duration_ms: Some(duration_millis(duration)),
            attempts: Some(attempts),
            error: Some(failure),
            ..Self::base(AuditAction::Error, tool, args, identity)
        }
    }

    /// Record written when auth rejects the call.
    #[must_use]
    pub fn denied(tool: &str, args: &Value, identity: &UserIdentity, reason: &str) -> Self {
        Self {
            reason: Some(reason.to_owned()),
            ..Self::base(AuditAction::Denied, tool, args, identity)
        }
    }

    /// Record written when the tool name is not registered.
    #[must_use]
    pub fn not_found(tool: &str, args: &Value, identity: &UserIdentity) -> Self {
        Self {
            reason: Some(format!("tool `{tool}` is not registered")),
            ..Self::base(AuditAction::NotFound, tool, args, identity)
        }
    }

    /// Overrides the record time. Used to place entries on a given day.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns the record time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the tool name.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Returns the recorded action.
    #[must_use]
    pub const fn action(&self) -> AuditAction {
        self.action
    }

    /// Returns the redacted call parameters.
    #[must_use]
    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Returns the caller's user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the caller's session id.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the caller's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns whether the call succeeded.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.success
    }

    /// Returns the duration of the terminal attempt in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    /// Returns the failure details of an `error` record.
    #[must_use]
    pub fn failure(&self) -> Option<&AuditFailure> {
        self.error.as_ref()
    }

    /// Returns the denial or not-found reason.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Returns how many backend attempts were made.
    #[must_use]
    pub const fn attempts(&self) -> Option<u32> {
        self.attempts
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
