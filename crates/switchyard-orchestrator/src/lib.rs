//! Response orchestration for the Switchyard gateway.
//!
//! This crate drives one client request through tool discovery, the initial
//! model stream, gateway-side tool execution, and the follow-up stream, and
//! rebuilds conversation chains from the call log for continuity requests.

pub mod continuity;
pub mod error;
pub mod followup;
pub mod machine;
pub mod upstream;

pub use continuity::{
    CallLogStore, ConversationChain, ConversationTurn, ContinuityReconstructor,
    LogFilter, LogRow,
};
pub use error::{OrchestrationError, Result};
pub use followup::build_follow_up_request;
pub use machine::{OrchestrationPhase, OrchestratorContext, ResponseOrchestrator};
pub use upstream::{ByteStream, EventStream, HttpUpstream, UpstreamClient};
