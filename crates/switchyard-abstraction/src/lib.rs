//! Shared abstractions for the Switchyard gateway.
//!
//! This crate defines the provider-config seam, the unified request and
//! response shapes, and the error type shared by every other Switchyard crate.

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Represents an error that can occur inside the gateway orchestration layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// An error occurred during an upstream API request (e.g., network issues).
    #[error("Transport Error: {0}")]
    Transport(String),

    /// The upstream provider returned an error response.
    #[error("Upstream Response Error: {0}")]
    UpstreamResponse(String),

    /// An error occurred during serialization or deserialization.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// The provider is not supported or misconfigured.
    #[error("Unsupported Provider: {0}")]
    UnsupportedProvider(String),

    /// A response reference could not be decoded.
    #[error("Invalid Response Reference: {0}")]
    InvalidReference(String),

    /// Other unexpected errors.
    #[error("Other Gateway Error: {0}")]
    Other(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// The input of a client request, either plain text or structured items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestInput {
    /// Plain text input.
    Text(String),
    /// Structured input items (messages, function-call echoes, tool outputs).
    Items(Vec<serde_json::Value>),
}

impl RequestInput {
    /// Returns true if the input carries no content.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Items(items) => items.is_empty(),
        }
    }

    /// Converts the input into a list of structured items.
    ///
    /// Plain text becomes a single user message item, so callers can always
    /// append further items when building a follow-up request.
    pub fn into_items(self) -> Vec<serde_json::Value> {
        match self {
            Self::Text(text) => vec![serde_json::json!({
                "type": "message",
                "role": "user",
                "content": text,
            })],
            Self::Items(items) => items,
        }
    }
}

impl Default for RequestInput {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// Auto-execution policy for a declared tool source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPolicy {
    /// The gateway may call tools itself and fold results back in.
    Never,
    /// Tool calls are returned to the client for resolution.
    #[default]
    Always,
}

/// A tool source declared by a client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Label of the tool source this declaration references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_label: Option<String>,
    /// Explicit allow-list of tool names; absent keeps everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    /// Whether the gateway may execute tool calls itself.
    #[serde(default)]
    pub require_approval: ApprovalPolicy,
}

impl ToolDeclaration {
    /// Creates a declaration for the given source label.
    pub fn new(server_label: impl Into<String>) -> Self {
        Self {
            server_label: Some(server_label.into()),
            allowed_tools: None,
            require_approval: ApprovalPolicy::default(),
        }
    }

    /// Sets the allow-list of tool names.
    #[must_use]
    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    /// Sets the approval policy.
    #[must_use]
    pub fn with_require_approval(mut self, policy: ApprovalPolicy) -> Self {
        self.require_approval = policy;
        self
    }
}

/// A client request as seen by the orchestration layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Model identifier for the upstream call.
    pub model: String,
    /// Request input, plain or structured.
    pub input: RequestInput,
    /// Declared tool sources.
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,
    /// Tool-choice/forcing directive, passed through to the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    /// Whether the caller asked for a streamed response.
    #[serde(default)]
    pub stream: bool,
    /// Reference to a prior response for conversation continuity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    /// Natural-language query used to narrow the discovered tool set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_query: Option<String>,
}

impl ModelRequest {
    /// Creates a new request for the given model and input.
    pub fn new(model: impl Into<String>, input: RequestInput) -> Self {
        Self {
            model: model.into(),
            input,
            tools: Vec::new(),
            tool_choice: None,
            stream: false,
            previous_response_id: None,
            relevance_query: None,
        }
    }

    /// Sets the declared tool sources.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    /// Sets the streaming preference.
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Sets the relevance query for semantic tool narrowing.
    #[must_use]
    pub fn with_relevance_query(mut self, query: impl Into<String>) -> Self {
        self.relevance_query = Some(query.into());
        self
    }
}

/// One item of a unified response's output.
///
/// Item kinds are open on the wire; fields that do not apply to a kind are
/// simply absent. Conversion to this shape happens once at the decode
/// boundary so downstream code never branches on raw JSON representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    /// Item kind discriminant (e.g., "message", "function_call").
    #[serde(rename = "type")]
    pub kind: String,
    /// Item identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Call identifier, present on function-call items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Tool name, present on function-call items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw argument string, present on function-call items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
    /// Message content, present on message items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    /// Item status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl OutputItem {
    /// Returns true if this item is a function call.
    pub fn is_function_call(&self) -> bool {
        self.kind == "function_call"
    }
}

/// The one normalized response representation all provider responses are
/// converted into before being returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResponse {
    /// Response identifier.
    pub id: String,
    /// Model that produced the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Response status (e.g., "completed").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Ordered output items.
    #[serde(default)]
    pub output: Vec<OutputItem>,
    /// Provider fields carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UnifiedResponse {
    /// Returns the function-call items of this response, in output order.
    pub fn function_calls(&self) -> Vec<&OutputItem> {
        self.output.iter().filter(|item| item.is_function_call()).collect()
    }
}

/// Per-request authentication context, handed through to collaborators.
///
/// The orchestration layer never inspects this beyond passing it on; the
/// tool registry and guardrails own the actual decisioning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated principal, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    /// Opaque metadata forwarded to collaborators.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Provider-specific request/response transformation interface.
///
/// One implementation per upstream provider; the gateway calls these
/// polymorphically and never branches on provider identity itself.
pub trait ProviderConfig: Send + Sync {
    /// Returns the deployment label folded into gateway-minted response ids.
    fn deployment(&self) -> &str;

    /// Builds the full request URL for the given API base and model.
    fn get_complete_url(&self, api_base: &str, model: &str) -> Result<String>;

    /// Resolves the request headers for the given auth context.
    fn validate_environment(&self, auth: &AuthContext) -> Result<Vec<(String, String)>>;

    /// Transforms a gateway request into the provider's wire body.
    ///
    /// `tools` carries the discovered tool definitions already rendered as
    /// provider-ready function schemas.
    fn transform_request(
        &self,
        request: &ModelRequest,
        tools: &[serde_json::Value],
    ) -> Result<serde_json::Value>;

    /// Transforms a provider response into the unified shape.
    ///
    /// `input` is the original request input, available as transformation
    /// context for providers whose responses omit echoed input.
    fn transform_response(
        &self,
        raw: serde_json::Value,
        input: &RequestInput,
    ) -> Result<UnifiedResponse>;
}

/// Metadata folded into a gateway-minted response reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ResponseReference {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment: Option<String>,
}

/// Prefix marking a gateway-minted response reference.
const REFERENCE_PREFIX: &str = "resp_swy_";

/// Folds routing metadata into a provider response id.
///
/// The result is an opaque gateway-minted id wrapping the provider id and
/// the originating deployment, decodable with [`decode_response_reference`].
pub fn fold_routing_metadata(provider_id: &str, deployment: &str) -> String {
    let reference = ResponseReference {
        id: provider_id.to_string(),
        deployment: Some(deployment.to_string()),
    };
    // ResponseReference has no non-serializable fields; this cannot fail.
    let json = serde_json::to_string(&reference).unwrap_or_default();
    format!("{}{}", REFERENCE_PREFIX, general_purpose::URL_SAFE_NO_PAD.encode(json))
}

/// Decodes a response reference back into `(provider_id, deployment)`.
///
/// References not minted by the gateway are passed through unchanged as the
/// provider id with no deployment, so plain provider ids keep working.
pub fn decode_response_reference(reference: &str) -> (String, Option<String>) {
    let Some(encoded) = reference.strip_prefix(REFERENCE_PREFIX) else {
        return (reference.to_string(), None);
    };

    let decoded = match general_purpose::URL_SAFE_NO_PAD.decode(encoded) {
        Ok(bytes) => bytes,
        Err(_) => return (reference.to_string(), None),
    };

    match serde_json::from_slice::<ResponseReference>(&decoded) {
        Ok(parsed) => (parsed.id, parsed.deployment),
        Err(_) => (reference.to_string(), None),
    }
}
