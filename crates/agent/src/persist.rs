//! Background persistence of a run's finalized messages.
//!
//! Runs after the output stream has closed. Every failure is logged and
//! skipped: one bad write never blocks the rest of the batch.

use std::collections::HashMap;

use toolchat_core::message::{Message, ToolCallMetadata};
use toolchat_core::store::{MessageStore, ToolStore};
use tracing::{debug, warn};

/// One timed tool execution, folded into the tool's statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub tool_id: String,
    pub latency_ms: u64,
    pub success: bool,
}

/// Counts of what the persistence pass managed to write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistReport {
    pub saved: usize,
    pub failed: usize,
}

/// Copy descriptor metadata onto every tool call the active set knows about.
pub fn enrich_tool_calls(message: &mut Message, metadata: &HashMap<String, ToolCallMetadata>) {
    for call in &mut message.tool_calls {
        if let Some(meta) = metadata.get(&call.function.name) {
            call.metadata = Some(meta.clone());
        }
    }
}

/// Write `batch` in order, enriching tool calls first.
pub async fn save_messages(
    store: &dyn MessageStore,
    batch: Vec<Message>,
    metadata: &HashMap<String, ToolCallMetadata>,
) -> PersistReport {
    let mut report = PersistReport::default();
    for mut message in batch {
        enrich_tool_calls(&mut message, metadata);
        match store.create_message(&message).await {
            Ok(()) => report.saved += 1,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Failed to persist message");
                report.failed += 1;
            }
        }
    }
    debug!(saved = report.saved, failed = report.failed, "Persisted run messages");
    report
}

/// Fold tool executions into the tool statistics.
pub async fn record_executions(store: &dyn ToolStore, executions: &[Execution]) {
    for exec in executions {
        if let Err(e) = store
            .record_execution(&exec.tool_id, exec.latency_ms, exec.success)
            .await
        {
            warn!(tool_id = %exec.tool_id, error = %e, "Failed to record tool execution");
        }
    }
}
