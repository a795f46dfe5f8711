//! Error types for tool operations.

use thiserror::Error;

/// Result type for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors that can occur during tool discovery and execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool registry listing or lookup failed.
    #[error("tool registry error: {0}")]
    Registry(String),

    /// A policy guardrail rejected the call.
    #[error("guardrail violation: {rule}")]
    Guardrail {
        /// Name of the rule that fired.
        rule: String,
    },

    /// Transport failure reaching the tool source.
    #[error("tool transport error: {0}")]
    Transport(String),

    /// No tool source owns the requested tool.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Semantic filter query failed.
    #[error("semantic filter error: {0}")]
    Filter(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
