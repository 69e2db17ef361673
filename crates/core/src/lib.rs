//! # toolchat Core
//!
//! Domain types, traits, and error definitions for the toolchat responder runtime.
//! This crate has **no framework dependencies**: it defines the domain model
//! that all other crates implement against.
//!
//! Every collaborator is defined as a trait here (LLM provider, message,
//! thread and tool stores, tool executors). Implementations live in their
//! respective crates, which keeps the agent testable with scripted mocks.

pub mod error;
pub mod message;
pub mod provider;
pub mod store;
pub mod thread;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{FunctionCall, Message, MessageToolCall, Role, ToolCallMetadata};
pub use provider::{
    FinishReason, MessageDelta, Provider, ProviderRequest, StreamChunk, ToolCallDelta,
    ToolDefinition,
};
pub use store::{MessageStore, ThreadStore, ToolStore};
pub use thread::Thread;
pub use tool::{AuthType, BaseTool, ToolDescriptor, ToolExecutor, ToolSet, ToolStats};
