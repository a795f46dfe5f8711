//! Per-call tool execution with failure isolation.

use crate::error::ToolError;
use crate::registry::{ToolContent, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_abstraction::AuthContext;
use tracing::{debug, warn};

/// Placeholder result text for a call that returned no content.
const EMPTY_RESULT_TEXT: &str = "Tool executed successfully";

/// A tool call extracted from a terminal model response.
///
/// Created once per model turn and consumed exactly once by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, stable across the call's event sub-sequence.
    pub call_id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// Raw argument string as produced by the model.
    pub arguments: String,
}

/// The outcome of one tool call.
///
/// Failures are rendered into `result_text` so the follow-up model turn can
/// explain why a call failed instead of silently omitting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the call this result answers.
    pub call_id: String,
    /// Collapsed result text, or a human-readable failure surrogate.
    pub result_text: String,
    /// Whether the call failed.
    #[serde(default)]
    pub is_error: bool,
}

/// Executes extracted tool calls against the registry.
pub struct ToolExecutor {
    registry: Arc<dyn ToolRegistry>,
}

impl ToolExecutor {
    /// Creates an executor over the given registry.
    pub fn new(registry: Arc<dyn ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Executes a batch of calls, one result per call in input order.
    ///
    /// Failures are isolated per call and never abort the batch; the
    /// returned vector is always the same length as the input.
    pub async fn execute(
        &self,
        tool_server_map: &HashMap<String, String>,
        calls: &[ToolCall],
        auth: &AuthContext,
    ) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_one(tool_server_map, call, auth).await);
        }
        results
    }

    async fn execute_one(
        &self,
        tool_server_map: &HashMap<String, String>,
        call: &ToolCall,
        auth: &AuthContext,
    ) -> ToolResult {
        let args = parse_arguments(&call.arguments);

        let Some(source) = tool_server_map.get(&call.name) else {
            warn!(tool = %call.name, "no tool source registered for call");
            return ToolResult {
                call_id: call.call_id.clone(),
                result_text: format!("No tool source is registered for '{}'", call.name),
                is_error: true,
            };
        };

        debug!(tool = %call.name, source = %source, "executing tool call");

        match self.registry.call_tool(source, &call.name, &args, auth).await {
            Ok(content) => ToolResult {
                call_id: call.call_id.clone(),
                result_text: collapse_content(&content),
                is_error: false,
            },
            Err(e) => ToolResult {
                call_id: call.call_id.clone(),
                result_text: render_failure(&call.name, &e),
                is_error: true,
            },
        }
    }
}

/// Parses a raw argument string leniently.
///
/// Models occasionally emit truncated or malformed argument JSON; an
/// unparsable string resolves to an empty map rather than failing the call.
fn parse_arguments(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::from_str(raw) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

/// Renders a call failure into result text, keeping the three failure
/// classes distinguishable for the follow-up model turn.
fn render_failure(tool_name: &str, error: &ToolError) -> String {
    match error {
        ToolError::Guardrail { rule } => {
            format!("Tool call '{}' was rejected by guardrail '{}'", tool_name, rule)
        }
        ToolError::Transport(message) => {
            format!("Tool call '{}' failed upstream: {}", tool_name, message)
        }
        _ => format!("Tool call '{}' failed with an unexpected error", tool_name),
    }
}

/// Collapses mixed tool content into one result string.
///
/// Text segments are joined by spaces; non-text segments are replaced by a
/// `[Generated <Kind>]` marker. Empty content becomes a fixed success line.
fn collapse_content(content: &[ToolContent]) -> String {
    let parts: Vec<String> = content
        .iter()
        .map(|item| match item {
            ToolContent::Text { text } => text.clone(),
            other => format!("[Generated {}]", other.kind_label()),
        })
        .collect();

    if parts.is_empty() {
        EMPTY_RESULT_TEXT.to_string()
    } else {
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::registry::ToolDescriptor;
    use async_trait::async_trait;

    /// Registry stub that fails specific tools with specific error classes.
    struct ScriptedRegistry {
        guardrail_blocked: Vec<String>,
        transport_failing: Vec<String>,
    }

    #[async_trait]
    impl ToolRegistry for ScriptedRegistry {
        async fn list_tools(&self, _sources: &[String]) -> Result<Vec<ToolDescriptor>> {
            Ok(Vec::new())
        }

        async fn call_tool(
            &self,
            _source: &str,
            name: &str,
            args: &serde_json::Map<String, serde_json::Value>,
            _auth: &AuthContext,
        ) -> Result<Vec<ToolContent>> {
            if self.guardrail_blocked.iter().any(|t| t == name) {
                return Err(ToolError::Guardrail { rule: "sensitive-data".to_string() });
            }
            if self.transport_failing.iter().any(|t| t == name) {
                return Err(ToolError::Transport("connection reset".to_string()));
            }
            Ok(vec![ToolContent::Text {
                text: format!("{} ran with {} args", name, args.len()),
            }])
        }
    }

    fn executor() -> ToolExecutor {
        ToolExecutor::new(Arc::new(ScriptedRegistry {
            guardrail_blocked: vec!["blocked".to_string()],
            transport_failing: vec!["flaky".to_string()],
        }))
    }

    fn call(id: &str, name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            call_id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn map_of(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_guardrail_failure_isolated_per_call() {
        let map = map_of(&[("search", "local"), ("blocked", "local"), ("fetch", "local")]);
        let calls = vec![
            call("c1", "search", r#"{"q": "x"}"#),
            call("c2", "blocked", "{}"),
            call("c3", "fetch", "{}"),
        ];

        let results =
            executor().execute(&map, &calls, &AuthContext::default()).await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert!(results[1].result_text.contains("sensitive-data"));
        assert!(!results[2].is_error);
    }

    #[tokio::test]
    async fn test_transport_failure_echoes_error() {
        let map = map_of(&[("flaky", "local")]);
        let results = executor()
            .execute(&map, &[call("c1", "flaky", "{}")], &AuthContext::default())
            .await;

        assert!(results[0].is_error);
        assert!(results[0].result_text.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_unmapped_tool_is_per_call_failure() {
        let map = map_of(&[("search", "local")]);
        let calls = vec![call("c1", "unknown", "{}"), call("c2", "search", "{}")];
        let results =
            executor().execute(&map, &calls, &AuthContext::default()).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_error);
        assert!(!results[1].is_error);
    }

    #[tokio::test]
    async fn test_unparsable_arguments_resolve_to_empty_map() {
        let map = map_of(&[("search", "local")]);
        let results = executor()
            .execute(&map, &[call("c1", "search", "{broken")], &AuthContext::default())
            .await;

        assert!(!results[0].is_error);
        assert!(results[0].result_text.contains("0 args"));
    }

    #[test]
    fn test_collapse_mixed_content() {
        let collapsed = collapse_content(&[
            ToolContent::Text { text: "found 3 results".to_string() },
            ToolContent::Image {
                data: "base64".to_string(),
                mime_type: "image/png".to_string(),
            },
            ToolContent::Text { text: "done".to_string() },
        ]);
        assert_eq!(collapsed, "found 3 results [Generated Image] done");
    }

    #[test]
    fn test_collapse_empty_content() {
        assert_eq!(collapse_content(&[]), "Tool executed successfully");
    }
}
