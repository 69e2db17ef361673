//! The responder agent: the tool-calling loop behind every chat turn.
//!
//! For one turn the agent:
//!
//! 1. **Prepares context**: system prompt, thread memory, and the history
//!    trimmed to the thread's token budget
//! 2. **Selects tools**: the most relevant registered OpenAPI tools,
//!    compiled into callable descriptors
//! 3. **Streams** a completion, forwarding every fragment to the caller
//! 4. **If tool calls**: runs them in parallel, emits the results, loops to 3
//! 5. **Otherwise** closes the stream and persists the turn in the background
//!
//! The loop is bounded by a step limit; the last permitted step is offered
//! no tools so the model has to answer in text.

pub mod context;
pub mod dispatch;
pub mod merge;
pub mod persist;
pub mod responder;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use dispatch::TOOL_FAILURE_MESSAGE;
pub use merge::{DeltaAccumulator, Merge};
pub use persist::{Execution, PersistReport};
pub use responder::{
    AgentRun, PreparedRun, Responder, ResponderConfig, RunInput, RunOutcome,
};
pub use stream_event::{AssistantDelta, OutputChunk};
