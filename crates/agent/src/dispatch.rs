//! Parallel tool-call dispatch.
//!
//! All calls of one assistant message run concurrently; results come back
//! in the order the calls appear in the message, whatever order they finish in.

use std::time::Instant;

use futures::future::join_all;
use serde_json::Value;
use toolchat_core::message::{Message, MessageToolCall};
use toolchat_core::tool::ToolSet;
use tracing::{debug, warn};

use crate::persist::Execution;

/// Tool-result content for calls the active set cannot serve.
pub const TOOL_FAILURE_MESSAGE: &str = "Failed to execute function";

/// The tool-result message for one call, plus its timing when a tool ran.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub message: Message,
    pub execution: Option<Execution>,
}

/// Run every call concurrently against `toolset`.
pub async fn dispatch(
    toolset: &ToolSet,
    calls: &[MessageToolCall],
    thread_id: &str,
) -> Vec<Dispatched> {
    join_all(calls.iter().map(|call| run_call(toolset, call, thread_id))).await
}

async fn run_call(toolset: &ToolSet, call: &MessageToolCall, thread_id: &str) -> Dispatched {
    let Some(descriptor) = toolset.get(&call.function.name) else {
        warn!(
            tool = %call.function.name,
            call_id = %call.id,
            "Model called a tool outside the active set"
        );
        return Dispatched {
            message: Message::tool_result(&call.id, TOOL_FAILURE_MESSAGE).in_thread(thread_id),
            execution: None,
        };
    };

    let started = Instant::now();
    let result = descriptor.executor.execute(&call.function.arguments).await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let success = result.get("error").is_none();

    debug!(
        tool = %descriptor.base_tool_name,
        method = %descriptor.method,
        path = %descriptor.path,
        latency_ms,
        success,
        "Tool call finished"
    );

    let content = match result {
        Value::String(s) => s,
        other => other.to_string(),
    };

    Dispatched {
        message: Message::tool_result(&call.id, content).in_thread(thread_id),
        execution: Some(Execution {
            tool_id: descriptor.base_tool_id.clone(),
            latency_ms,
            success,
        }),
    }
}
