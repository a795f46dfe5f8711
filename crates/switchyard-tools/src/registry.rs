//! Collaborator seams to the tool registry and semantic filter.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchyard_abstraction::AuthContext;

/// A callable tool definition, converted at the registry boundary.
///
/// Internal code only ever sees this shape; raw registry records are
/// converted on ingress so nothing downstream branches on representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tool input schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

impl ToolDescriptor {
    /// Creates a descriptor with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, input_schema: None }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Renders this descriptor as a provider-ready function schema.
    pub fn to_function_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "name": self.name,
            "description": self.description.clone().unwrap_or_default(),
            "parameters": self
                .input_schema
                .clone()
                .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
        })
    }
}

/// Content returned by one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// Text content.
        text: String,
    },
    /// Image content.
    Image {
        /// Image data (base64 encoded or URL).
        data: String,
        /// MIME type.
        mime_type: String,
    },
    /// Audio content.
    Audio {
        /// Audio data (base64 encoded or URL).
        data: String,
        /// MIME type.
        mime_type: String,
    },
}

impl ToolContent {
    /// Human-readable kind label used when collapsing mixed content.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Text { .. } => "Text",
            Self::Image { .. } => "Image",
            Self::Audio { .. } => "Audio",
        }
    }
}

/// Registry of remotely-hosted tool sources.
///
/// Shared, read-mostly service; implementations own their concurrency
/// control and call timeouts.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Lists tool definitions across the given sources, in source order.
    async fn list_tools(&self, sources: &[String]) -> Result<Vec<ToolDescriptor>>;

    /// Calls one tool on one source.
    async fn call_tool(
        &self,
        source: &str,
        name: &str,
        args: &serde_json::Map<String, serde_json::Value>,
        auth: &AuthContext,
    ) -> Result<Vec<ToolContent>>;
}

/// Semantic-relevance filter capability.
#[async_trait]
pub trait SemanticFilter: Send + Sync {
    /// Ranks tools relevant to the prompt across the allowed sources,
    /// returning up to `top_k` tool names, best first.
    async fn query(&self, prompt: &str, sources: &[String], top_k: usize)
    -> Result<Vec<String>>;
}
