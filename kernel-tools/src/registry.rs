//! Registry mapping tool names to handlers and classifications.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Side-effect class of a tool. Decides whether transient failures may be
/// replayed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolClassification {
    /// Read-only data access.
    Query,
    /// Side-effecting operation.
    Command,
    /// Metadata and introspection.
    Discovery,
}

impl ToolClassification {
    /// Returns `true` when a transient failure may be retried automatically.
    #[must_use]
    pub const fn is_retry_eligible(self) -> bool {
        matches!(self, Self::Query | Self::Discovery)
    }

    /// Returns the wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Command => "command",
            Self::Discovery => "discovery",
        }
    }
}

impl fmt::Display for ToolClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata describing a registered tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolDescriptor {
    name: String,
    classification: ToolClassification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl ToolDescriptor {
    /// Creates a descriptor for the supplied name and classification.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidDescriptor`] if the name is blank.
    pub fn new(name: impl Into<String>, classification: ToolClassification) -> ToolResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolError::InvalidDescriptor {
                reason: "tool name cannot be empty".into(),
            });
        }

        Ok(Self {
            name,
            classification,
            description: None,
        })
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the classification.
    #[must_use]
    pub const fn classification(&self) -> ToolClassification {
        self.classification
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Trait implemented by backend tool handlers.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with the given JSON arguments, returning JSON output.
    async fn invoke(&self, args: Value) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(Value) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, args: Value) -> ToolResult<Value> {
        (self)(args).await
    }
}

/// Handle returned by the registry for direct invocation.
#[derive(Clone)]
pub struct ToolHandle {
    descriptor: ToolDescriptor,
    handler: Arc<dyn Tool>,
}

impl ToolHandle {
    /// Returns the associated descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Executes the underlying handler once.
    ///
    /// # Errors
    ///
    /// Propagates whatever the handler returns.
    pub async fn invoke(&self, args: Value) -> ToolResult<Value> {
        self.handler.invoke(args).await
    }
}

impl fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandle")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// A backend collaborator that contributes tools at startup.
pub trait ToolProvider {
    /// Name of the backend, used in logs.
    fn name(&self) -> &str;

    /// Registers every tool the backend exposes.
    ///
    /// # Errors
    ///
    /// Propagates registration failures such as duplicate names.
    fn register(&self, builder: &mut ToolRegistryBuilder) -> ToolResult<()>;
}

/// Mutable registration phase of a [`ToolRegistry`].
#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: HashMap<String, ToolHandle>,
}

impl ToolRegistryBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool handler.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::DuplicateTool`] if the name is already present.
    pub fn register<T>(&mut self, descriptor: ToolDescriptor, tool: T) -> ToolResult<&mut Self>
    where
        T: Tool + 'static,
    {
        let name = descriptor.name().to_owned();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }

        debug!(tool = %name, classification = %descriptor.classification(), "tool registered");
        self.tools.insert(
            name,
            ToolHandle {
                descriptor,
                handler: Arc::new(tool),
            },
        );
        Ok(self)
    }

    /// Lets a backend register its tools.
    ///
    /// # Errors
    ///
    /// Propagates the provider's registration failure.
    pub fn provider(&mut self, provider: &dyn ToolProvider) -> ToolResult<&mut Self> {
        let before = self.tools.len();
        provider.register(self)?;
        debug!(
            provider = provider.name(),
            tools = self.tools.len() - before,
            "backend registered"
        );
        Ok(self)
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> ToolRegistry {
        ToolRegistry { tools: self.tools }
    }
}

/// Read-only mapping from tool name to handler and classification.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolHandle>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .finish()
    }
}

impl ToolRegistry {
    /// Starts a registration phase.
    #[must_use]
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    /// Returns a handle to the tool matching the supplied name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolHandle> {
        self.tools.get(name).cloned()
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Invokes a registered tool directly, bypassing every middleware.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the tool is not found or
    /// propagates the handler's error.
    pub async fn invoke(&self, name: &str, args: Value) -> ToolResult<Value> {
        let handle = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_owned(),
        })?;
        handle.invoke(args).await
    }

    /// Lists every descriptor, sorted by name.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<_> = self
            .tools
            .values()
            .map(|handle| handle.descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Errors produced by tool registration and by tool handlers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool descriptor failed validation.
    #[error("invalid tool descriptor: {reason}")]
    InvalidDescriptor {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// Arguments were rejected by the handler.
    #[error("invalid arguments: {reason}")]
    Validation {
        /// What was wrong with the arguments.
        reason: String,
    },

    /// The handler or its upstream did not answer in time.
    #[error("timed out: {reason}")]
    Timeout {
        /// What timed out.
        reason: String,
    },

    /// The handler could not reach its upstream.
    #[error("connection failed: {reason}")]
    Connection {
        /// Connection failure detail.
        reason: String,
    },

    /// The upstream refused the operation.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Refusal detail.
        reason: String,
    },

    /// Any other handler failure.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the handler.
        reason: String,
    },
}

impl ToolError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::Timeout {
            reason: reason.into(),
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    /// Creates a permission-denied error.
    #[must_use]
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Creates an execution error.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }
}
