//! Tool registration for the kernel.
//!
//! Backend collaborators describe each tool with a [`registry::ToolDescriptor`]
//! and hand it, together with its handler, to a
//! [`registry::ToolRegistryBuilder`] at startup. The finished
//! [`registry::ToolRegistry`] is immutable and shared freely.

#![warn(missing_docs, clippy::pedantic)]

pub mod registry;

pub use registry::{
    Tool, ToolClassification, ToolDescriptor, ToolError, ToolHandle, ToolProvider, ToolRegistry,
    ToolRegistryBuilder, ToolResult,
};
