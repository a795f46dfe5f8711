//! Follow-up request construction after gateway-side tool execution.

use serde_json::json;
use switchyard_abstraction::{ModelRequest, RequestInput, UnifiedResponse};
use switchyard_tools::{ToolCall, ToolResult};

/// Builds the follow-up request that folds tool results back into the
/// conversation.
///
/// The input replays the original items, then the assistant turn that
/// requested the calls, then one function-call echo and one output item per
/// executed call. The follow-up carries no tool declarations, so it cannot
/// trigger a second execution round.
pub fn build_follow_up_request(
    original: &ModelRequest,
    captured: &UnifiedResponse,
    calls: &[ToolCall],
    results: &[ToolResult],
) -> ModelRequest {
    let mut items = original.input.clone().into_items();

    let requested: Vec<serde_json::Value> = captured
        .function_calls()
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect();
    if !requested.is_empty() {
        items.push(json!({
            "type": "message",
            "role": "assistant",
            "content": requested,
        }));
    }

    for call in calls {
        items.push(json!({
            "type": "function_call",
            "call_id": call.call_id,
            "name": call.name,
            "arguments": call.arguments,
        }));
    }

    for result in results {
        items.push(json!({
            "type": "function_call_output",
            "call_id": result.call_id,
            "output": result.result_text,
        }));
    }

    let mut request = ModelRequest::new(original.model.clone(), RequestInput::Items(items))
        .with_stream(original.stream);
    request.previous_response_id = Some(captured.id.clone());
    request
}
