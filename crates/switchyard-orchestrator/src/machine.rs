//! Five-phase orchestration over one client request.
//!
//! The orchestrator drives discovery, the initial model call, gateway-side
//! tool execution, and the follow-up model call as one forward-only state
//! machine. Callers pull events one at a time; synthetic events (discovery
//! and call progress) are interleaved with forwarded upstream events in
//! phase order.

use crate::error::Result;
use crate::followup::build_follow_up_request;
use crate::upstream::{EventStream, UpstreamClient};
use std::collections::VecDeque;
use std::sync::Arc;
use switchyard_abstraction::{
    ApprovalPolicy, AuthContext, ModelRequest, ProviderConfig, ToolDeclaration,
    UnifiedResponse,
};
use switchyard_events::{ChunkDecoder, StreamEvent};
use switchyard_tools::{
    Discovery, SemanticFilter, ToolCall, ToolDiscovery, ToolExecutor, ToolRegistry,
    ToolResult,
};
use tracing::{debug, info, warn};

/// The phases of one orchestrated response, in traversal order.
///
/// Transitions only ever move forward; a phase is never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestrationPhase {
    /// Fetching, filtering, and deduplicating declared tools.
    Discovery,
    /// Streaming the initial model response.
    InitialResponse,
    /// Executing extracted tool calls gateway-side.
    ToolExecution,
    /// Streaming the follow-up response with tool results folded in.
    FollowUpResponse,
    /// Terminal state; no further events.
    Finished,
}

/// Shared collaborators handed to every orchestrated request.
#[derive(Clone)]
pub struct OrchestratorContext {
    /// Registry of remotely-hosted tool sources.
    pub registry: Arc<dyn ToolRegistry>,
    /// Upstream model client.
    pub upstream: Arc<dyn UpstreamClient>,
    /// Provider config for the routed deployment.
    pub provider: Arc<dyn ProviderConfig>,
    /// Optional semantic filter for tool narrowing.
    pub filter: Option<Arc<dyn SemanticFilter>>,
}

impl OrchestratorContext {
    /// Creates a context without a semantic filter.
    pub fn new(
        registry: Arc<dyn ToolRegistry>,
        upstream: Arc<dyn UpstreamClient>,
        provider: Arc<dyn ProviderConfig>,
    ) -> Self {
        Self { registry, upstream, provider, filter: None }
    }

    /// Attaches a semantic filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn SemanticFilter>) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Orchestrates one client request into one outgoing event stream.
pub struct ResponseOrchestrator {
    request: ModelRequest,
    auth: AuthContext,
    ctx: OrchestratorContext,
    phase: OrchestrationPhase,
    /// Events decoded or synthesized but not yet pulled by the caller.
    pending: VecDeque<StreamEvent>,
    /// Sequence counter for synthetic events.
    sequence: u64,
    /// Output index counter for synthetic items.
    output_index: u64,
    discovery: Discovery,
    current_stream: Option<EventStream>,
    /// Terminal event of the initial stream, held until the phase decision.
    held_terminal: Option<StreamEvent>,
    captured: Option<UnifiedResponse>,
    calls: Vec<ToolCall>,
    /// Set once the per-call progress events have been queued, so execution
    /// waits until the caller has drained them.
    calls_announced: bool,
    /// Output index of the first call item.
    call_base_index: u64,
    results: Vec<ToolResult>,
}

impl ResponseOrchestrator {
    /// Creates an orchestrator for one request.
    pub fn new(request: ModelRequest, auth: AuthContext, ctx: OrchestratorContext) -> Self {
        Self {
            request,
            auth,
            ctx,
            phase: OrchestrationPhase::Discovery,
            pending: VecDeque::new(),
            sequence: 0,
            output_index: 0,
            discovery: Discovery::default(),
            current_stream: None,
            held_terminal: None,
            captured: None,
            calls: Vec::new(),
            calls_announced: false,
            call_base_index: 0,
            results: Vec::new(),
        }
    }

    /// Returns true if the orchestration layer applies to this request.
    ///
    /// Requests without tool declarations pass through as a plain streamed
    /// model call.
    pub fn applies_to(request: &ModelRequest) -> bool {
        !request.tools.is_empty()
    }

    /// Returns the current phase.
    pub fn phase(&self) -> OrchestrationPhase {
        self.phase
    }

    /// Returns the next outgoing event, or `None` once the stream is done.
    ///
    /// # Errors
    ///
    /// Returns an error if an upstream call fails; synthetic phases degrade
    /// instead of erroring where the protocol defines a failure event.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            match self.phase {
                OrchestrationPhase::Discovery => self.step_discovery().await?,
                OrchestrationPhase::InitialResponse => self.step_initial().await?,
                OrchestrationPhase::ToolExecution => self.step_tool_execution().await?,
                OrchestrationPhase::FollowUpResponse => self.step_follow_up().await?,
                OrchestrationPhase::Finished => return Ok(None),
            }
        }
    }

    /// Gateway-side execution requires every declared source to opt in.
    fn auto_execute(&self) -> bool {
        !self.request.tools.is_empty()
            && self
                .request
                .tools
                .iter()
                .all(|decl| decl.require_approval == ApprovalPolicy::Never)
    }

    fn push_synthetic(&mut self, make: impl FnOnce(u64) -> StreamEvent) {
        let event = make(self.sequence);
        self.sequence += 1;
        self.pending.push_back(event);
    }

    async fn step_discovery(&mut self) -> Result<()> {
        if !Self::applies_to(&self.request) {
            self.phase = OrchestrationPhase::InitialResponse;
            return Ok(());
        }

        let item_id = format!("mcpl_{}", uuid::Uuid::new_v4().simple());
        let index = self.output_index;
        self.output_index += 1;

        self.push_synthetic(|seq| StreamEvent::ListToolsInProgress {
            sequence_number: seq,
            output_index: index,
            item_id: item_id.clone(),
        });

        let mut pipeline = ToolDiscovery::new(self.ctx.registry.clone());
        if let Some(filter) = &self.ctx.filter {
            pipeline = pipeline.with_filter(filter.clone());
        }

        match pipeline
            .discover(
                &self.request.tools,
                self.request.relevance_query.as_deref(),
                &self.auth,
            )
            .await
        {
            Ok(discovery) => {
                info!(tools = discovery.tools.len(), "tool discovery completed");
                self.discovery = discovery;
                self.push_synthetic(|seq| StreamEvent::ListToolsCompleted {
                    sequence_number: seq,
                    output_index: index,
                    item_id: item_id.clone(),
                });
            }
            Err(e) => {
                // Discovery failure degrades to an empty tool list; the
                // model call still proceeds.
                warn!(error = %e, "tool discovery failed");
                self.push_synthetic(|seq| StreamEvent::ListToolsFailed {
                    sequence_number: seq,
                    output_index: index,
                    item_id: item_id.clone(),
                });
            }
        }

        let item = list_tools_item(&self.request.tools, &self.discovery, &item_id);
        self.push_synthetic(|seq| StreamEvent::OutputItemDone {
            sequence_number: seq,
            output_index: index,
            item_id: item_id.clone(),
            item,
        });

        self.phase = OrchestrationPhase::InitialResponse;
        Ok(())
    }

    async fn step_initial(&mut self) -> Result<()> {
        if self.current_stream.is_none() {
            let schemas: Vec<serde_json::Value> = self
                .discovery
                .tools
                .iter()
                .map(|tool| tool.to_function_schema())
                .collect();
            debug!(tools = schemas.len(), "opening initial model stream");
            let request = self.request.clone();
            self.open_stream(&request, &schemas).await?;
        }

        let Some(stream) = self.current_stream.as_mut() else {
            self.phase = OrchestrationPhase::Finished;
            return Ok(());
        };

        match stream.next_event().await? {
            Some(event) if event.is_terminal() => {
                // Held back until we know whether a follow-up supersedes it.
                self.held_terminal = Some(event);
            }
            Some(event) => self.pending.push_back(event),
            None => {
                let captured = stream.take_final_response();
                self.current_stream = None;
                self.finish_initial(captured);
            }
        }
        Ok(())
    }

    /// Decides where the stream goes once the initial response has drained.
    fn finish_initial(&mut self, captured: Option<UnifiedResponse>) {
        let Some(response) = captured else {
            warn!("initial stream ended without a terminal event");
            self.phase = OrchestrationPhase::Finished;
            return;
        };

        let calls = extract_calls(&response);
        if self.auto_execute() && !calls.is_empty() {
            info!(calls = calls.len(), "executing tool calls gateway-side");
            // The follow-up stream carries the real terminal event.
            self.held_terminal = None;
            self.captured = Some(response);
            self.calls = calls;
            self.phase = OrchestrationPhase::ToolExecution;
        } else {
            if let Some(terminal) = self.held_terminal.take() {
                self.pending.push_back(terminal);
            }
            self.phase = OrchestrationPhase::Finished;
        }
    }

    /// Runs in two steps: the first queues the per-call progress events and
    /// returns so the caller sees them while tools run; the second, entered
    /// once those events have drained, executes the batch and queues the
    /// completion events.
    async fn step_tool_execution(&mut self) -> Result<()> {
        if !self.calls_announced {
            self.announce_calls();
            return Ok(());
        }

        let calls = self.calls.clone();
        let base_index = self.call_base_index;
        let executor = ToolExecutor::new(self.ctx.registry.clone());
        let results = executor
            .execute(&self.discovery.tool_server_map, &calls, &self.auth)
            .await;

        for (i, (call, result)) in calls.iter().zip(&results).enumerate() {
            let index = base_index + i as u64;
            let item_id = call.call_id.clone();
            if result.is_error {
                self.push_synthetic(|seq| StreamEvent::CallFailed {
                    sequence_number: seq,
                    output_index: index,
                    item_id: item_id.clone(),
                });
            } else {
                self.push_synthetic(|seq| StreamEvent::CallCompleted {
                    sequence_number: seq,
                    output_index: index,
                    item_id: item_id.clone(),
                });
            }

            let item = call_record_item(call, result);
            self.push_synthetic(|seq| StreamEvent::OutputItemDone {
                sequence_number: seq,
                output_index: index,
                item_id: item_id.clone(),
                item,
            });
        }

        self.results = results;
        self.phase = OrchestrationPhase::FollowUpResponse;
        Ok(())
    }

    /// Queues the in-progress/arguments triplet for every extracted call.
    fn announce_calls(&mut self) {
        self.calls_announced = true;
        self.call_base_index = self.output_index;
        self.output_index += self.calls.len() as u64;

        let calls = self.calls.clone();
        for (i, call) in calls.iter().enumerate() {
            let index = self.call_base_index + i as u64;
            let item_id = call.call_id.clone();
            self.push_synthetic(|seq| StreamEvent::CallInProgress {
                sequence_number: seq,
                output_index: index,
                item_id: item_id.clone(),
            });
            self.push_synthetic(|seq| StreamEvent::CallArgumentsDelta {
                sequence_number: seq,
                output_index: index,
                item_id: item_id.clone(),
                delta: call.arguments.clone(),
            });
            self.push_synthetic(|seq| StreamEvent::CallArgumentsDone {
                sequence_number: seq,
                output_index: index,
                item_id: item_id.clone(),
                arguments: call.arguments.clone(),
            });
        }
    }

    async fn step_follow_up(&mut self) -> Result<()> {
        if self.current_stream.is_none() {
            let Some(captured) = self.captured.as_ref() else {
                self.phase = OrchestrationPhase::Finished;
                return Ok(());
            };
            let request = build_follow_up_request(
                &self.request,
                captured,
                &self.calls,
                &self.results,
            );
            debug!(previous = ?request.previous_response_id, "opening follow-up stream");
            self.open_stream(&request, &[]).await?;
        }

        let Some(stream) = self.current_stream.as_mut() else {
            self.phase = OrchestrationPhase::Finished;
            return Ok(());
        };

        match stream.next_event().await? {
            Some(event) => self.pending.push_back(event),
            None => {
                self.current_stream = None;
                self.phase = OrchestrationPhase::Finished;
            }
        }
        Ok(())
    }

    async fn open_stream(
        &mut self,
        request: &ModelRequest,
        tools: &[serde_json::Value],
    ) -> Result<()> {
        let bytes = self.ctx.upstream.stream_response(request, tools, &self.auth).await?;
        let decoder = ChunkDecoder::with_deployment(self.ctx.provider.deployment());
        self.current_stream = Some(EventStream::new(bytes, decoder));
        Ok(())
    }
}

/// Renders the discovery result as a complete output item.
///
/// Every declared source label is carried, and each tool entry names the
/// source it was attributed to, so a multi-source listing stays traceable.
fn list_tools_item(
    declared: &[ToolDeclaration],
    discovery: &Discovery,
    item_id: &str,
) -> serde_json::Value {
    let server_labels: Vec<String> =
        declared.iter().filter_map(|decl| decl.server_label.clone()).collect();

    let tools: Vec<serde_json::Value> = discovery
        .tools
        .iter()
        .map(|tool| {
            let mut value = serde_json::to_value(tool).unwrap_or_default();
            if let (Some(object), Some(source)) =
                (value.as_object_mut(), discovery.tool_server_map.get(&tool.name))
            {
                object.insert(
                    "server_label".to_string(),
                    serde_json::Value::String(source.clone()),
                );
            }
            value
        })
        .collect();

    serde_json::json!({
        "id": item_id,
        "type": "mcp_list_tools",
        "server_labels": server_labels,
        "tools": tools,
    })
}

/// Extracts executable tool calls from a captured response.
///
/// Function-call items missing a call id or name are skipped with a warning
/// rather than failing the turn.
fn extract_calls(response: &UnifiedResponse) -> Vec<ToolCall> {
    response
        .function_calls()
        .into_iter()
        .filter_map(|item| {
            let (Some(call_id), Some(name)) = (&item.call_id, &item.name) else {
                warn!(kind = %item.kind, "skipping function call without call_id or name");
                return None;
            };
            Some(ToolCall {
                call_id: call_id.clone(),
                name: name.clone(),
                arguments: item.arguments.clone().unwrap_or_default(),
            })
        })
        .collect()
}

/// Renders an executed call as a complete output item.
fn call_record_item(call: &ToolCall, result: &ToolResult) -> serde_json::Value {
    serde_json::json!({
        "id": call.call_id,
        "type": "mcp_call",
        "name": call.name,
        "arguments": call.arguments,
        "output": result.result_text,
        "error": if result.is_error {
            serde_json::Value::String(result.result_text.clone())
        } else {
            serde_json::Value::Null
        },
    })
}
