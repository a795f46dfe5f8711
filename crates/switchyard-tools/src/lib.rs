//! Tool discovery and execution for the Switchyard gateway.
//!
//! This crate owns the ingress types for remotely-hosted tools, the
//! collaborator seams to the tool registry and semantic filter, the
//! discovery/deduplication/filtering pipeline, and the per-call executor.

pub mod discovery;
pub mod error;
pub mod executor;
pub mod registry;

pub use discovery::{Discovery, ToolDiscovery};
pub use error::{Result, ToolError};
pub use executor::{ToolCall, ToolExecutor, ToolResult};
pub use registry::{SemanticFilter, ToolContent, ToolDescriptor, ToolRegistry};
