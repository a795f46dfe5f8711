//! Protocol event model and chunk decoding for Switchyard streams.
//!
//! This crate owns the closed set of typed events that make up one outgoing
//! response stream, and the decoder that turns server-sent-event frames into
//! those events.

pub mod decoder;
pub mod event;

pub use decoder::{ChunkDecoder, FrameBuffer};
pub use event::StreamEvent;
