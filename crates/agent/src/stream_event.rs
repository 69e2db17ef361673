//! Output chunks emitted by an agent run.
//!
//! The caller sees two kinds of chunk, serialized untagged:
//! - assistant deltas: `{"id": ..., "role"?: ..., "content"?: ..., "tool_calls"?: [...]}`
//!   where `id` is the step's message id, shared by every delta of the step
//! - tool results: a full `role: "tool"` message answering one tool call
//!
//! Over HTTP each chunk is one NDJSON line.

use serde::Serialize;
use toolchat_core::message::Message;
use toolchat_core::provider::MessageDelta;

/// A partial assistant message, stamped with its step's id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantDelta {
    pub id: String,

    #[serde(flatten)]
    pub delta: MessageDelta,
}

/// One element of the run's output stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutputChunk {
    Delta(AssistantDelta),
    ToolResult(Message),
}

impl OutputChunk {
    pub fn delta(id: impl Into<String>, delta: MessageDelta) -> Self {
        Self::Delta(AssistantDelta {
            id: id.into(),
            delta,
        })
    }

    /// The message id this chunk belongs to.
    pub fn message_id(&self) -> &str {
        match self {
            Self::Delta(d) => &d.id,
            Self::ToolResult(m) => &m.id,
        }
    }

    /// Serialize as one newline-terminated JSON line.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchat_core::message::Role;
    use toolchat_core::provider::{FunctionDelta, ToolCallDelta};

    #[test]
    fn delta_serialization() {
        let chunk = OutputChunk::delta(
            "step-1",
            MessageDelta {
                role: Some(Role::Assistant),
                content: Some("Hel".into()),
                tool_calls: vec![],
            },
        );
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["id"], "step-1");
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "Hel");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn tool_call_delta_serialization() {
        let chunk = OutputChunk::delta(
            "step-1",
            MessageDelta {
                tool_calls: vec![ToolCallDelta {
                    index: Some(0),
                    id: Some("call_1".into()),
                    kind: Some("function".into()),
                    function: Some(FunctionDelta {
                        name: Some("k3j9xq2m".into()),
                        arguments: Some("{\"ci".into()),
                    }),
                }],
                ..MessageDelta::default()
            },
        );
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["tool_calls"][0]["function"]["arguments"], "{\"ci");
        assert!(json.get("content").is_none());
    }

    #[test]
    fn tool_result_serialization() {
        let msg = Message::tool_result("call_1", "{\"temp\":\"20C\"}").in_thread("t1");
        let chunk = OutputChunk::ToolResult(msg.clone());
        assert_eq!(chunk.message_id(), msg.id);

        let line = chunk.to_ndjson().unwrap();
        assert!(line.ends_with('\n'));
        let json: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert_eq!(json["content"], "{\"temp\":\"20C\"}");
    }
}
