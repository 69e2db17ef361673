//! Delta merging: rebuilds a complete assistant message from streamed fragments.
//!
//! Rules, applied field by field for every field present in the fragment:
//! - free text (`content`) and tool-call `arguments` are appended
//! - tool-call arrays merge element-wise, by explicit `index` when the
//!   fragment carries one, by position otherwise; extra elements are appended
//! - nested objects (`function`) merge recursively
//! - anything else is replaced by the incoming value

use toolchat_core::message::{Message, MessageToolCall, Role};
use toolchat_core::provider::{
    FinishReason, FunctionDelta, MessageDelta, StreamChunk, ToolCallDelta, Usage,
};

/// Fold `fragment` into `self`.
pub trait Merge {
    fn merge(&mut self, fragment: Self);
}

fn append(existing: &mut Option<String>, incoming: Option<String>) {
    match (existing.as_mut(), incoming) {
        (Some(current), Some(more)) => current.push_str(&more),
        (None, Some(more)) => *existing = Some(more),
        (_, None) => {}
    }
}

fn replace<T>(existing: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *existing = incoming;
    }
}

impl Merge for FunctionDelta {
    fn merge(&mut self, fragment: Self) {
        replace(&mut self.name, fragment.name);
        append(&mut self.arguments, fragment.arguments);
    }
}

impl Merge for ToolCallDelta {
    fn merge(&mut self, fragment: Self) {
        replace(&mut self.index, fragment.index);
        replace(&mut self.id, fragment.id);
        replace(&mut self.kind, fragment.kind);
        match (self.function.as_mut(), fragment.function) {
            (Some(current), Some(incoming)) => current.merge(incoming),
            (None, incoming @ Some(_)) => self.function = incoming,
            (_, None) => {}
        }
    }
}

impl Merge for Vec<ToolCallDelta> {
    fn merge(&mut self, fragment: Self) {
        for (position, incoming) in fragment.into_iter().enumerate() {
            match incoming.index {
                // An explicit index may arrive out of order or skip ahead
                Some(target) => {
                    if target >= self.len() {
                        self.resize_with(target + 1, ToolCallDelta::default);
                    }
                    self[target].merge(incoming);
                }
                None => match self.get_mut(position) {
                    Some(existing) => existing.merge(incoming),
                    None => self.push(incoming),
                },
            }
        }
    }
}

impl Merge for MessageDelta {
    fn merge(&mut self, fragment: Self) {
        replace(&mut self.role, fragment.role);
        append(&mut self.content, fragment.content);
        if !fragment.tool_calls.is_empty() {
            self.tool_calls.merge(fragment.tool_calls);
        }
    }
}

/// Per-step accumulator over a provider's fragment stream.
#[derive(Debug, Default, Clone)]
pub struct DeltaAccumulator {
    delta: MessageDelta,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl DeltaAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: StreamChunk) {
        self.delta.merge(chunk.delta);
        replace(&mut self.finish_reason, chunk.finish_reason);
        replace(&mut self.usage, chunk.usage);
    }

    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    /// Finalize into a complete assistant message with the step's id.
    pub fn into_message(self, id: &str, thread_id: &str) -> Message {
        let tool_calls: Vec<MessageToolCall> = self
            .delta
            .tool_calls
            .into_iter()
            // Slots opened by an index gap that never got filled
            .filter(|tc| tc.id.is_some() || tc.function.is_some())
            .map(|tc| {
                let function = tc.function.unwrap_or_default();
                let mut call = MessageToolCall::new(
                    tc.id
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                    function.name.unwrap_or_default(),
                    function.arguments.unwrap_or_default(),
                );
                if let Some(kind) = tc.kind {
                    call.kind = kind;
                }
                call
            })
            .collect();

        let content = match self.delta.content {
            Some(c) => Some(c),
            None if tool_calls.is_empty() => Some(String::new()),
            None => None,
        };

        let mut message = Message::assistant("").in_thread(thread_id);
        message.id = id.to_string();
        message.role = self.delta.role.unwrap_or(Role::Assistant);
        message.content = content;
        message.tool_calls = tool_calls;
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> MessageDelta {
        MessageDelta {
            content: Some(s.into()),
            ..MessageDelta::default()
        }
    }

    fn call(index: Option<usize>, id: Option<&str>, name: Option<&str>, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            kind: None,
            function: Some(FunctionDelta {
                name: name.map(String::from),
                arguments: Some(args.into()),
            }),
        }
    }

    fn merged(fragments: Vec<MessageDelta>) -> MessageDelta {
        let mut acc = MessageDelta::default();
        for f in fragments {
            acc.merge(f);
        }
        acc
    }

    #[test]
    fn text_concatenation_is_associative() {
        let one_by_one = merged(vec![text("a"), text("b"), text("c")]);
        let grouped = merged(vec![text("ab"), text("c")]);
        assert_eq!(one_by_one.content.as_deref(), Some("abc"));
        assert_eq!(one_by_one, grouped);
    }

    #[test]
    fn arrays_merge_by_position() {
        let mut acc = MessageDelta {
            tool_calls: vec![call(None, Some("1"), None, "{\"x\":")],
            ..MessageDelta::default()
        };
        acc.merge(MessageDelta {
            tool_calls: vec![ToolCallDelta {
                function: Some(FunctionDelta {
                    name: None,
                    arguments: Some("1}".into()),
                }),
                ..ToolCallDelta::default()
            }],
            ..MessageDelta::default()
        });

        assert_eq!(acc.tool_calls.len(), 1);
        assert_eq!(acc.tool_calls[0].id.as_deref(), Some("1"));
        assert_eq!(
            acc.tool_calls[0].function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"x\":1}")
        );
    }

    #[test]
    fn explicit_index_targets_the_right_call() {
        let acc = merged(vec![
            MessageDelta {
                tool_calls: vec![
                    call(Some(0), Some("a"), Some("f1"), ""),
                    call(Some(1), Some("b"), Some("f2"), ""),
                ],
                ..MessageDelta::default()
            },
            // OpenAI sends one call per fragment, each with its own index
            MessageDelta {
                tool_calls: vec![call(Some(1), None, None, "{\"y\":2}")],
                ..MessageDelta::default()
            },
            MessageDelta {
                tool_calls: vec![call(Some(0), None, None, "{\"x\":1}")],
                ..MessageDelta::default()
            },
        ]);

        let args: Vec<_> = acc
            .tool_calls
            .iter()
            .map(|c| c.function.as_ref().unwrap().arguments.clone().unwrap())
            .collect();
        assert_eq!(args, vec!["{\"x\":1}", "{\"y\":2}"]);
    }

    #[test]
    fn out_of_order_indices_land_in_their_slots() {
        let acc = merged(vec![
            MessageDelta {
                tool_calls: vec![call(Some(1), Some("b"), Some("f2"), "")],
                ..MessageDelta::default()
            },
            MessageDelta {
                tool_calls: vec![call(Some(0), Some("a"), Some("f1"), "")],
                ..MessageDelta::default()
            },
            MessageDelta {
                tool_calls: vec![call(Some(1), None, None, "{\"y\":2}")],
                ..MessageDelta::default()
            },
            MessageDelta {
                tool_calls: vec![call(Some(0), None, None, "{\"x\":1}")],
                ..MessageDelta::default()
            },
        ]);

        let calls: Vec<_> = acc
            .tool_calls
            .iter()
            .map(|c| {
                let f = c.function.as_ref().unwrap();
                (
                    c.id.as_deref().unwrap(),
                    f.name.as_deref().unwrap(),
                    f.arguments.as_deref().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            calls,
            vec![("a", "f1", "{\"x\":1}"), ("b", "f2", "{\"y\":2}")]
        );
    }

    #[test]
    fn repeated_non_zero_index_is_one_call() {
        let mut acc = DeltaAccumulator::new();
        for args in ["{\"q\":", "\"rust\"}"] {
            acc.push(StreamChunk {
                delta: MessageDelta {
                    tool_calls: vec![call(Some(1), Some("call_9"), Some("search"), args)],
                    ..MessageDelta::default()
                },
                ..StreamChunk::default()
            });
        }

        let msg = acc.into_message("s", "t");
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].id, "call_9");
        assert_eq!(msg.tool_calls[0].function.arguments, "{\"q\":\"rust\"}");
    }

    #[test]
    fn extra_elements_are_appended() {
        let acc = merged(vec![
            MessageDelta {
                tool_calls: vec![call(None, Some("a"), Some("f1"), "{}")],
                ..MessageDelta::default()
            },
            MessageDelta {
                tool_calls: vec![
                    ToolCallDelta::default(),
                    call(None, Some("b"), Some("f2"), "{}"),
                ],
                ..MessageDelta::default()
            },
        ]);
        assert_eq!(acc.tool_calls.len(), 2);
        assert_eq!(acc.tool_calls[1].id.as_deref(), Some("b"));
    }

    #[test]
    fn non_concatenative_fields_are_replaced() {
        let acc = merged(vec![
            MessageDelta {
                tool_calls: vec![call(Some(0), Some("a"), Some("get_weather"), "")],
                ..MessageDelta::default()
            },
            MessageDelta {
                tool_calls: vec![call(Some(0), Some("a"), Some("get_weather"), "{}")],
                ..MessageDelta::default()
            },
        ]);
        let f = acc.tool_calls[0].function.as_ref().unwrap();
        assert_eq!(f.name.as_deref(), Some("get_weather"));
        assert_eq!(acc.tool_calls[0].id.as_deref(), Some("a"));
    }

    #[test]
    fn missing_fields_leave_accumulator_untouched() {
        let mut acc = text("hello");
        acc.merge(MessageDelta::default());
        assert_eq!(acc.content.as_deref(), Some("hello"));
    }

    #[test]
    fn accumulator_finalizes_tool_call_message() {
        let mut acc = DeltaAccumulator::new();
        acc.push(StreamChunk {
            delta: MessageDelta {
                role: Some(Role::Assistant),
                tool_calls: vec![call(Some(0), Some("call_1"), Some("k3j9xq2m"), "{\"city\":")],
                ..MessageDelta::default()
            },
            ..StreamChunk::default()
        });
        acc.push(StreamChunk {
            delta: MessageDelta {
                tool_calls: vec![call(Some(0), None, None, "\"Tokyo\"}")],
                ..MessageDelta::default()
            },
            ..StreamChunk::default()
        });
        acc.push(StreamChunk::finish(FinishReason::ToolCalls));

        assert_eq!(acc.finish_reason(), Some(&FinishReason::ToolCalls));
        let msg = acc.into_message("step-1", "t1");
        assert_eq!(msg.id, "step-1");
        assert_eq!(msg.thread_id.as_deref(), Some("t1"));
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls[0].id, "call_1");
        assert_eq!(msg.tool_calls[0].function.arguments, "{\"city\":\"Tokyo\"}");
        assert_eq!(msg.tool_calls[0].kind, "function");
    }

    #[test]
    fn accumulator_finalizes_text_message() {
        let mut acc = DeltaAccumulator::new();
        acc.push(StreamChunk::text("Sunny, "));
        acc.push(StreamChunk::text("20C."));
        acc.push(StreamChunk::finish(FinishReason::Stop));
        let msg = acc.into_message("step-2", "t1");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.text(), "Sunny, 20C.");
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn empty_stream_yields_empty_text() {
        let msg = DeltaAccumulator::new().into_message("s", "t");
        assert_eq!(msg.content.as_deref(), Some(""));
    }
}
