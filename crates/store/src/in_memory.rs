//! In-memory store: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use toolchat_core::error::StoreError;
use toolchat_core::message::Message;
use toolchat_core::store::{MessageStore, ThreadStore, ToolStore};
use toolchat_core::thread::Thread;
use toolchat_core::tool::BaseTool;

use crate::keywords;

/// Keeps messages, threads and tools in process memory.
///
/// Tool relevance is plain keyword overlap against the tool's name,
/// description and document.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    messages: Arc<RwLock<Vec<Message>>>,
    threads: Arc<RwLock<HashMap<String, Thread>>>,
    tools: Arc<RwLock<Vec<BaseTool>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn relevance(tool: &BaseTool, terms: &[String]) -> usize {
    let haystack = format!("{} {} {}", tool.name, tool.description, tool.schema).to_lowercase();
    terms
        .iter()
        .map(|t| haystack.matches(t.as_str()).count().min(5))
        .sum()
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn create_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        match messages.iter_mut().find(|m| m.id == message.id) {
            Some(existing) => *existing = message.clone(),
            None => messages.push(message.clone()),
        }
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.thread_id.as_deref() == Some(thread_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ThreadStore for InMemoryStore {
    async fn get_thread(&self, id: &str) -> Result<Option<Thread>, StoreError> {
        Ok(self.threads.read().await.get(id).cloned())
    }

    async fn create_thread(&self, thread: &Thread) -> Result<(), StoreError> {
        self.threads
            .write()
            .await
            .insert(thread.id.clone(), thread.clone());
        Ok(())
    }
}

#[async_trait]
impl ToolStore for InMemoryStore {
    async fn create_tool(&self, tool: &BaseTool) -> Result<(), StoreError> {
        let mut tools = self.tools.write().await;
        match tools.iter_mut().find(|t| t.id == tool.id) {
            Some(existing) => *existing = tool.clone(),
            None => tools.push(tool.clone()),
        }
        Ok(())
    }

    async fn get_tool(&self, id: &str) -> Result<Option<BaseTool>, StoreError> {
        Ok(self.tools.read().await.iter().find(|t| t.id == id).cloned())
    }

    async fn list_tools(&self) -> Result<Vec<BaseTool>, StoreError> {
        Ok(self.tools.read().await.clone())
    }

    async fn tools_by_prompt(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BaseTool>, StoreError> {
        let tools = self.tools.read().await;
        let terms = keywords::extract(query);

        if terms.is_empty() {
            // Nothing to rank on: most recently registered first
            return Ok(tools.iter().rev().take(limit).cloned().collect());
        }

        let mut scored: Vec<(usize, &BaseTool)> = tools
            .iter()
            .map(|t| (relevance(t, &terms), t))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn record_execution(
        &self,
        tool_id: &str,
        latency_ms: u64,
        success: bool,
    ) -> Result<(), StoreError> {
        let mut tools = self.tools.write().await;
        let tool = tools
            .iter_mut()
            .find(|t| t.id == tool_id)
            .ok_or_else(|| StoreError::NotFound(format!("tool {tool_id}")))?;
        tool.stats.record(latency_ms, success);
        Ok(())
    }
}
