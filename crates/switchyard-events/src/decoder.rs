//! Chunk decoder for server-sent-event framed response streams.

use crate::event::StreamEvent;
use switchyard_abstraction::{UnifiedResponse, fold_routing_metadata};
use tracing::{debug, warn};

/// SSE frame prefix stripped before parsing.
const DATA_PREFIX: &str = "data: ";

/// Literal end-of-stream sentinel.
const DONE_SENTINEL: &str = "[DONE]";

/// Decodes one framed stream into typed protocol events.
///
/// The decoder is stateful: it latches onto the done-sentinel and captures
/// the aggregate response exactly once when the terminal event arrives.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    /// Deployment label folded into the terminal response id.
    deployment: Option<String>,
    /// Set once the done-sentinel has been seen; no further frames decode.
    finished: bool,
    /// Aggregate response captured from the terminal event.
    final_response: Option<UnifiedResponse>,
}

impl ChunkDecoder {
    /// Creates a decoder without routing metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder that folds the given deployment into the terminal
    /// response id.
    pub fn with_deployment(deployment: impl Into<String>) -> Self {
        Self { deployment: Some(deployment.into()), ..Self::default() }
    }

    /// Decodes one frame into a protocol event.
    ///
    /// Returns `None` for empty frames, the done-sentinel, frames after the
    /// sentinel, and malformed frames; a malformed frame is logged and the
    /// stream continues.
    pub fn decode(&mut self, frame: &str) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }

        let frame = frame.trim_end_matches(['\r', '\n']);
        if frame.is_empty() {
            return None;
        }

        let payload = frame.strip_prefix(DATA_PREFIX).unwrap_or(frame);
        if payload.trim() == DONE_SENTINEL {
            debug!("stream done sentinel received");
            self.finished = true;
            return None;
        }

        let event: StreamEvent = match serde_json::from_str(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "skipping malformed stream frame");
                return None;
            }
        };

        Some(self.post_process(event))
    }

    /// Returns true once the done-sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the captured aggregate response, if the terminal event has
    /// been decoded.
    pub fn final_response(&self) -> Option<&UnifiedResponse> {
        self.final_response.as_ref()
    }

    /// Takes the captured aggregate response out of the decoder.
    pub fn take_final_response(&mut self) -> Option<UnifiedResponse> {
        self.final_response.take()
    }

    /// Rewrites the terminal event's response id with routing metadata and
    /// captures the aggregate response. Only the terminal variant carries or
    /// requires the rewrite; delta and progress events pass through.
    fn post_process(&mut self, event: StreamEvent) -> StreamEvent {
        match event {
            StreamEvent::ResponseCompleted { sequence_number, mut response } => {
                if let Some(deployment) = &self.deployment {
                    response.id = fold_routing_metadata(&response.id, deployment);
                }
                if self.final_response.is_none() {
                    self.final_response = Some(response.clone());
                }
                StreamEvent::ResponseCompleted { sequence_number, response }
            }
            other => other,
        }
    }
}

/// Buffers raw byte chunks and yields complete newline-delimited frames.
///
/// Upstream bodies arrive as arbitrary byte chunks; a frame boundary, or
/// even a multi-byte character, may be split anywhere, so bytes are held
/// until the terminating newline and only complete lines are converted to
/// text.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
}

impl FrameBuffer {
    /// Creates an empty frame buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a byte chunk and returns the complete frames it unlocked.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(idx) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=idx).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            frames.push(String::from_utf8_lossy(&line).into_owned());
        }
        frames
    }

    /// Returns the trailing partial line, if any.
    ///
    /// Used at end of stream to flush a final frame that arrived without a
    /// terminating newline.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            let bytes = std::mem::take(&mut self.buffer);
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}
