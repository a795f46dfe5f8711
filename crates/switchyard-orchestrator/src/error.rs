//! Error types for orchestration.

use switchyard_abstraction::GatewayError;
use switchyard_tools::ToolError;
use thiserror::Error;

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Errors that can occur while orchestrating a response stream.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Upstream transport or provider transformation failure.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Tool discovery or execution failure.
    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    /// Call-log store query failure.
    #[error("call-log store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
