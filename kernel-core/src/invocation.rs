//! Per-call state machine.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Stages a single tool call passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    /// Created, nothing done yet.
    Pending,
    /// Resolving the tool name.
    Lookup,
    /// No such tool.
    NotFound,
    /// Evaluating the caller's permissions.
    AuthCheck,
    /// Caller lacks the required permission.
    Denied,
    /// Permission granted; the backend has not run yet.
    Authorized,
    /// The backend is running.
    Executing,
    /// Waiting out a backoff before the next attempt.
    Retrying,
    /// The backend returned a result.
    Succeeded,
    /// The call ended in an error.
    Failed,
}

impl InvocationState {
    /// Returns `true` once no further events are accepted.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Denied | Self::Succeeded | Self::Failed
        )
    }
}

/// Events that move an invocation between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationEvent {
    /// Start resolving the tool.
    Begin,
    /// The tool is registered.
    Found,
    /// The tool is not registered.
    Missing,
    /// Auth allowed the call.
    Allow,
    /// Auth rejected the call.
    Deny,
    /// An attempt starts.
    Start,
    /// A transient failure will be retried.
    RetryScheduled,
    /// The backend succeeded.
    Succeed,
    /// The call failed.
    Fail,
}

/// Tracks one call through [`InvocationState`].
#[derive(Debug, Clone)]
pub struct Invocation {
    tool: String,
    state: InvocationState,
}

impl Invocation {
    /// Creates a pending invocation of `tool`.
    #[must_use]
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            state: InvocationState::Pending,
        }
    }

    /// Returns the tool name.
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> InvocationState {
        self.state
    }

    /// Applies an event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::InvalidTransition`] when the event is not
    /// allowed from the current state.
    pub fn transition(&mut self, event: InvocationEvent) -> InvocationResult<InvocationState> {
        use InvocationEvent as E;
        use InvocationState as S;

        let next = match (self.state, event) {
            (S::Pending, E::Begin) => Some(S::Lookup),
            (S::Lookup, E::Found) => Some(S::AuthCheck),
            (S::Lookup, E::Missing) => Some(S::NotFound),
            (S::AuthCheck, E::Allow) => Some(S::Authorized),
            (S::AuthCheck, E::Deny) => Some(S::Denied),
            (S::Authorized | S::Retrying, E::Start) => Some(S::Executing),
            (S::Executing, E::RetryScheduled) => Some(S::Retrying),
            (S::Executing, E::Succeed) => Some(S::Succeeded),
            (S::Authorized | S::Executing, E::Fail) => Some(S::Failed),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(InvocationError::InvalidTransition {
                tool: self.tool.clone(),
                from: self.state,
                event,
            });
        };

        debug!(tool = %self.tool, from = ?self.state, to = ?next_state, ?event, "invocation transition");
        self.state = next_state;
        Ok(next_state)
    }
}

/// Errors emitted by the invocation state machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvocationError {
    /// Event not permitted from the current state.
    #[error("invalid invocation transition from {from:?} via {event:?} for tool `{tool}`")]
    InvalidTransition {
        /// Tool being invoked.
        tool: String,
        /// State before the event.
        from: InvocationState,
        /// Rejected event.
        event: InvocationEvent,
    },
}

/// Result alias for invocation transitions.
pub type InvocationResult<T> = Result<T, InvocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(events: &[InvocationEvent]) -> InvocationResult<InvocationState> {
        let mut invocation = Invocation::new("geowiz.parse_las_file");
        let mut state = invocation.state();
        for event in events {
            state = invocation.transition(*event)?;
        }
        Ok(state)
    }

    #[test]
    fn success_with_retries() {
        use InvocationEvent::*;
        let state = drive(&[
            Begin,
            Found,
            Allow,
            Start,
            RetryScheduled,
            Start,
            RetryScheduled,
            Start,
            Succeed,
        ])
        .unwrap();
        assert_eq!(state, InvocationState::Succeeded);
        assert!(state.is_terminal());
    }

    #[test]
    fn early_exits_are_terminal() {
        use InvocationEvent::*;
        assert_eq!(drive(&[Begin, Missing]).unwrap(), InvocationState::NotFound);
        assert_eq!(drive(&[Begin, Found, Deny]).unwrap(), InvocationState::Denied);
        assert_eq!(drive(&[Begin, Found, Allow, Fail]).unwrap(), InvocationState::Failed);
    }

    #[test]
    fn denied_call_cannot_execute() {
        use InvocationEvent::*;
        let err = drive(&[Begin, Found, Deny, Start]).unwrap_err();
        assert!(matches!(
            err,
            InvocationError::InvalidTransition {
                from: InvocationState::Denied,
                event: Start,
                ..
            }
        ));
    }

    #[test]
    fn cannot_skip_auth() {
        use InvocationEvent::*;
        assert!(drive(&[Begin, Start]).is_err());
        assert!(drive(&[Begin, Found, Start]).is_err());
    }
}
