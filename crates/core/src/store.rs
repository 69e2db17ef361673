//! Store traits: durable persistence of threads, messages and tools.
//!
//! The agent only reads threads and tools and only appends messages.
//! Implementations: SQLite (production) and in-memory (tests, ephemeral).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::Message;
use crate::thread::Thread;
use crate::tool::BaseTool;

/// Append-only message persistence per thread.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message. Writing an id that already exists overwrites it.
    async fn create_message(&self, message: &Message) -> Result<(), StoreError>;

    /// All messages of a thread, oldest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, StoreError>;
}

/// Thread lookup and creation.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    async fn get_thread(&self, id: &str) -> Result<Option<Thread>, StoreError>;

    async fn create_thread(&self, thread: &Thread) -> Result<(), StoreError>;
}

/// Registered tools and relevance search over them.
#[async_trait]
pub trait ToolStore: Send + Sync {
    async fn create_tool(&self, tool: &BaseTool) -> Result<(), StoreError>;

    async fn get_tool(&self, id: &str) -> Result<Option<BaseTool>, StoreError>;

    async fn list_tools(&self) -> Result<Vec<BaseTool>, StoreError>;

    /// Tools ranked by relevance to `query`, at most `limit` of them.
    async fn tools_by_prompt(&self, query: &str, limit: usize)
    -> Result<Vec<BaseTool>, StoreError>;

    /// Fold one execution into the tool's statistics.
    async fn record_execution(
        &self,
        tool_id: &str,
        latency_ms: u64,
        success: bool,
    ) -> Result<(), StoreError>;
}
