//! Typed protocol events for one outgoing response stream.
//!
//! This is the canonical event contract consumed by gateway clients. Every
//! variant carries a `sequence_number` that strictly increases within one
//! logical stream, and events describing the same logical item share an
//! `item_id` across their sub-sequence.

use serde::{Deserialize, Serialize};
use switchyard_abstraction::UnifiedResponse;

/// One event of a response stream, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Tool discovery against a declared source has started.
    #[serde(rename = "response.mcp_list_tools.in_progress")]
    ListToolsInProgress {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
    },

    /// Tool discovery finished successfully.
    #[serde(rename = "response.mcp_list_tools.completed")]
    ListToolsCompleted {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
    },

    /// Tool discovery failed; an empty tool list item still follows.
    #[serde(rename = "response.mcp_list_tools.failed")]
    ListToolsFailed {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
    },

    /// A gateway-executed tool call has started.
    #[serde(rename = "response.mcp_call.in_progress")]
    CallInProgress {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
    },

    /// A fragment of a tool call's argument string.
    #[serde(rename = "response.mcp_call_arguments.delta")]
    CallArgumentsDelta {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
        delta: String,
    },

    /// A tool call's argument string is complete.
    #[serde(rename = "response.mcp_call_arguments.done")]
    CallArgumentsDone {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
        arguments: String,
    },

    /// A gateway-executed tool call finished successfully.
    #[serde(rename = "response.mcp_call.completed")]
    CallCompleted {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
    },

    /// A gateway-executed tool call failed; its result text explains why.
    #[serde(rename = "response.mcp_call.failed")]
    CallFailed {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
    },

    /// A complete output item (tool list, call record, message).
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
        item: serde_json::Value,
    },

    /// A fragment of model-generated text.
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        sequence_number: u64,
        output_index: u64,
        item_id: String,
        delta: String,
    },

    /// Terminal event carrying the aggregate response envelope.
    #[serde(rename = "response.completed")]
    ResponseCompleted {
        sequence_number: u64,
        response: UnifiedResponse,
    },
}

impl StreamEvent {
    /// Returns this event's sequence number.
    pub fn sequence_number(&self) -> u64 {
        match self {
            Self::ListToolsInProgress { sequence_number, .. }
            | Self::ListToolsCompleted { sequence_number, .. }
            | Self::ListToolsFailed { sequence_number, .. }
            | Self::CallInProgress { sequence_number, .. }
            | Self::CallArgumentsDelta { sequence_number, .. }
            | Self::CallArgumentsDone { sequence_number, .. }
            | Self::CallCompleted { sequence_number, .. }
            | Self::CallFailed { sequence_number, .. }
            | Self::OutputItemDone { sequence_number, .. }
            | Self::OutputTextDelta { sequence_number, .. }
            | Self::ResponseCompleted { sequence_number, .. } => *sequence_number,
        }
    }

    /// Returns this event's item id, if it describes a logical item.
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::ListToolsInProgress { item_id, .. }
            | Self::ListToolsCompleted { item_id, .. }
            | Self::ListToolsFailed { item_id, .. }
            | Self::CallInProgress { item_id, .. }
            | Self::CallArgumentsDelta { item_id, .. }
            | Self::CallArgumentsDone { item_id, .. }
            | Self::CallCompleted { item_id, .. }
            | Self::CallFailed { item_id, .. }
            | Self::OutputItemDone { item_id, .. }
            | Self::OutputTextDelta { item_id, .. } => Some(item_id),
            Self::ResponseCompleted { .. } => None,
        }
    }

    /// Returns true if this is the terminal event of a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ResponseCompleted { .. })
    }
}
