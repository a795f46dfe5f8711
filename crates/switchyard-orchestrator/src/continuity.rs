//! Conversation reconstruction from the call log.
//!
//! Clients reference a prior response by its gateway-minted id; the
//! reconstructor resolves that reference against the call log and rebuilds
//! the conversation chain that led up to it.

use crate::error::{OrchestrationError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchyard_abstraction::{
    ProviderConfig, RequestInput, UnifiedResponse, decode_response_reference,
};
use tracing::{debug, warn};

/// One recorded request/response pair from the call log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRow {
    /// Provider response id recorded for this call.
    pub request_id: String,
    /// Session the call belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// When the call finished.
    pub end_time: DateTime<Utc>,
    /// The request body as recorded.
    pub recorded_request: serde_json::Value,
    /// The response body as recorded, in whatever shape the provider produced.
    pub recorded_response: serde_json::Value,
}

/// Query filter over the call log.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Match a single call by its recorded response id.
    pub request_id: Option<String>,
    /// Match every call of a session.
    pub session_id: Option<String>,
}

/// Seam to the call-log store.
#[async_trait]
pub trait CallLogStore: Send + Sync {
    /// Returns the rows matching the filter, in no particular order.
    async fn query(&self, filter: &LogFilter) -> Result<Vec<LogRow>>;
}

/// One reconstructed turn of a conversation.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    /// The input of the recorded request.
    pub input: RequestInput,
    /// The normalized recorded response.
    pub output: UnifiedResponse,
}

/// A conversation chain, oldest turn first.
#[derive(Debug, Clone, Default)]
pub struct ConversationChain {
    /// Reconstructed turns in chronological order.
    pub turns: Vec<ConversationTurn>,
    /// Session the chain was resolved from, if any.
    pub session_id: Option<String>,
}

impl ConversationChain {
    /// Flattens the chain into structured input items for a new request.
    ///
    /// Each turn contributes its input items followed by the assistant's
    /// message items, so the result can be prepended to fresh input.
    pub fn to_input_items(&self) -> Vec<serde_json::Value> {
        let mut items = Vec::new();
        for turn in &self.turns {
            items.extend(turn.input.clone().into_items());
            for output in &turn.output.output {
                if let Ok(value) = serde_json::to_value(output) {
                    items.push(value);
                }
            }
        }
        items
    }
}

/// Rebuilds conversation chains from call-log rows.
pub struct ContinuityReconstructor {
    store: Arc<dyn CallLogStore>,
    provider: Arc<dyn ProviderConfig>,
}

impl ContinuityReconstructor {
    /// Creates a reconstructor over the given store and provider.
    pub fn new(store: Arc<dyn CallLogStore>, provider: Arc<dyn ProviderConfig>) -> Self {
        Self { store, provider }
    }

    /// Reconstructs the conversation chain ending at the referenced response.
    ///
    /// An unknown reference resolves to an empty chain rather than an error,
    /// so a client holding a stale id still gets a usable (fresh)
    /// conversation. Rows recorded after the referenced response are not part
    /// of the chain being continued and are excluded.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store query itself fails.
    pub async fn reconstruct(&self, reference: &str) -> Result<ConversationChain> {
        let (provider_id, _deployment) = decode_response_reference(reference);

        let anchor_rows = self
            .store
            .query(&LogFilter { request_id: Some(provider_id.clone()), ..LogFilter::default() })
            .await?;
        let Some(anchor) = anchor_rows.into_iter().next() else {
            debug!(reference = %provider_id, "no call-log row for reference");
            return Ok(ConversationChain::default());
        };

        let mut rows = match &anchor.session_id {
            Some(session_id) => {
                self.store
                    .query(&LogFilter {
                        session_id: Some(session_id.clone()),
                        ..LogFilter::default()
                    })
                    .await?
            }
            None => vec![anchor.clone()],
        };

        // Chronological order, truncated at the referenced response itself
        // so tied timestamps cannot leak later rows into the chain.
        rows.sort_by_key(|row| row.end_time);
        match rows.iter().position(|row| row.request_id == anchor.request_id) {
            Some(pos) => rows.truncate(pos + 1),
            None => rows.retain(|row| row.end_time <= anchor.end_time),
        }

        let turns = rows.into_iter().filter_map(|row| self.rebuild_turn(row)).collect();

        Ok(ConversationChain { turns, session_id: anchor.session_id })
    }

    /// Rebuilds one turn from a recorded row, skipping rows that no longer
    /// parse.
    fn rebuild_turn(&self, row: LogRow) -> Option<ConversationTurn> {
        let input: RequestInput = match row.recorded_request.get("input") {
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(input) => input,
                Err(e) => {
                    warn!(id = %row.request_id, error = %e, "skipping row with unreadable input");
                    return None;
                }
            },
            None => {
                warn!(id = %row.request_id, "skipping row without recorded input");
                return None;
            }
        };

        let output = self.normalize_response(row.recorded_response, &input);
        match output {
            Ok(output) => Some(ConversationTurn { input, output }),
            Err(e) => {
                warn!(id = %row.request_id, error = %e, "skipping row with unreadable response");
                None
            }
        }
    }

    /// Normalizes a recorded response into the unified shape.
    ///
    /// Rows recorded in the unified shape parse directly; rows recorded in a
    /// provider's native shape go through the provider transformation.
    fn normalize_response(
        &self,
        recorded: serde_json::Value,
        input: &RequestInput,
    ) -> Result<UnifiedResponse> {
        if recorded.get("output").is_some_and(serde_json::Value::is_array) {
            return Ok(serde_json::from_value(recorded)?);
        }
        self.provider
            .transform_response(recorded, input)
            .map_err(OrchestrationError::Gateway)
    }
}
