//! Shared test helpers for agent tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use toolchat_core::error::ProviderError;
use toolchat_core::message::Role;
use toolchat_core::provider::{
    ChunkReceiver, FinishReason, FunctionDelta, MessageDelta, Provider, ProviderRequest,
    StreamChunk, ToolCallDelta,
};
use toolchat_core::tool::{ToolDescriptor, ToolExecutor};

/// What one scripted step streams back.
pub type Reply = Result<Vec<Result<StreamChunk, ProviderError>>, ProviderError>;

type Script = Box<dyn Fn(&ProviderRequest, usize) -> Reply + Send + Sync>;

/// A mock provider driven by a script over (request, step number).
///
/// Every request is recorded so tests can inspect what the agent sent.
pub struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: impl Fn(&ProviderRequest, usize) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replies in order. Panics if more steps are requested than scripted.
    pub fn sequence(replies: Vec<Reply>) -> Self {
        Self::new(move |_, step| {
            replies.get(step).cloned().unwrap_or_else(|| {
                panic!(
                    "ScriptedProvider: no more replies (step #{step}, have {})",
                    replies.len()
                )
            })
        })
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let step = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        let chunks = (self.script)(&request, step)?;

        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            tx.try_send(chunk).unwrap();
        }
        Ok(rx)
    }
}

/// A text answer, streamed in two halves.
pub fn text_reply(text: &str) -> Reply {
    let mid = text.len() / 2;
    let mid = (0..=mid).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
    let mut first = StreamChunk::text(&text[..mid]);
    first.delta.role = Some(Role::Assistant);
    Ok(vec![
        Ok(first),
        Ok(StreamChunk::text(&text[mid..])),
        Ok(StreamChunk::finish(FinishReason::Stop)),
    ])
}

/// Tool calls `(id, name, arguments)`, each streamed as a header fragment
/// followed by its arguments split in two.
pub fn tool_call_reply(calls: &[(&str, &str, &str)]) -> Reply {
    let mut chunks = Vec::new();
    for (index, (id, name, args)) in calls.iter().enumerate() {
        let mid = args.len() / 2;
        chunks.push(Ok(tool_fragment(index, Some(id), Some(name), &args[..mid])));
        chunks.push(Ok(tool_fragment(index, None, None, &args[mid..])));
    }
    chunks.push(Ok(StreamChunk::finish(FinishReason::ToolCalls)));
    Ok(chunks)
}

fn tool_fragment(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> StreamChunk {
    StreamChunk {
        delta: MessageDelta {
            tool_calls: vec![ToolCallDelta {
                index: Some(index),
                id: id.map(String::from),
                kind: id.map(|_| "function".to_string()),
                function: Some(FunctionDelta {
                    name: name.map(String::from),
                    arguments: Some(args.to_string()),
                }),
            }],
            ..MessageDelta::default()
        },
        ..StreamChunk::default()
    }
}

/// A descriptor named `name` backed by `executor`, owned by base tool `tool-{name}`.
pub fn descriptor(name: &str, executor: Arc<dyn ToolExecutor>) -> ToolDescriptor {
    ToolDescriptor {
        name: name.to_string(),
        description: format!("GET /{name}: test tool"),
        parameters: serde_json::json!({ "type": "object", "properties": {}, "required": [] }),
        method: "GET".into(),
        path: format!("/{name}"),
        operation_id: None,
        base_tool_id: format!("tool-{name}"),
        base_tool_name: name.to_string(),
        executor,
    }
}
