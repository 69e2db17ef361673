//! History trimming against a token budget.
//!
//! Messages are grouped before anything is dropped: an assistant message
//! that requested tool calls travels together with the tool results that
//! answer it. A trim never splits a group, so the model never sees a tool
//! result without its call. Tool results with no call in front of them
//! are discarded outright.

use std::collections::HashSet;

use toolchat_core::message::{Message, Role};
use tracing::debug;

use super::token::estimate_messages_tokens;

/// Split `messages` into atomic groups, oldest first.
pub fn group_messages(messages: &[Message]) -> Vec<Vec<Message>> {
    let mut groups: Vec<Vec<Message>> = Vec::new();
    let mut open_calls: HashSet<String> = HashSet::new();

    for message in messages {
        if message.role == Role::Tool {
            let answers_open_call = message
                .tool_call_id
                .as_deref()
                .is_some_and(|id| open_calls.contains(id));
            match groups.last_mut() {
                Some(group) if answers_open_call => group.push(message.clone()),
                _ => debug!(message_id = %message.id, "Dropping orphan tool result"),
            }
            continue;
        }

        open_calls = message.tool_calls.iter().map(|tc| tc.id.clone()).collect();
        groups.push(vec![message.clone()]);
    }

    groups
}

/// Keep the newest groups whose estimated size fits within `budget` tokens.
///
/// The newest group is always kept, even when it alone exceeds the budget:
/// a request with no history at all is never useful.
pub fn trim_to_budget(messages: &[Message], budget: usize) -> Vec<Message> {
    let groups = group_messages(messages);
    let mut kept: Vec<Vec<Message>> = Vec::new();
    let mut used = 0;

    for group in groups.into_iter().rev() {
        let cost = estimate_messages_tokens(&group);
        if !kept.is_empty() && used + cost > budget {
            break;
        }
        used += cost;
        kept.push(group);
    }

    kept.into_iter().rev().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolchat_core::message::MessageToolCall;

    fn call_message(ids: &[&str]) -> Message {
        let mut msg = Message::assistant("");
        msg.content = None;
        msg.tool_calls = ids
            .iter()
            .map(|id| MessageToolCall::new(*id, "f", "{}"))
            .collect();
        msg
    }

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| m.text().to_string()).collect()
    }

    #[test]
    fn everything_fits() {
        let msgs = vec![Message::user("a"), Message::assistant("b"), Message::user("c")];
        assert_eq!(trim_to_budget(&msgs, 1000), msgs);
    }

    #[test]
    fn oldest_messages_go_first() {
        let msgs = vec![
            Message::user("first"),
            Message::assistant("second"),
            Message::user("third"),
        ];
        // each message costs 6 tokens
        let trimmed = trim_to_budget(&msgs, 12);
        assert_eq!(ids(&trimmed), vec!["second", "third"]);
    }

    #[test]
    fn tool_call_group_is_atomic() {
        let msgs = vec![
            Message::user("What's the weather in Tokyo and Paris?"),
            call_message(&["c1", "c2"]),
            Message::tool_result("c1", "{\"temp\":\"20C\"}"),
            Message::tool_result("c2", "{\"temp\":\"12C\"}"),
            Message::user("thanks"),
        ];
        let groups = group_messages(&msgs);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].len(), 3);

        // Budget large enough for the last user message but not the whole group
        let trimmed = trim_to_budget(&msgs, 10);
        assert_eq!(trimmed.len(), 1);
        assert_eq!(trimmed[0].text(), "thanks");

        // Whole group fits: every tool result keeps its call
        let trimmed = trim_to_budget(&msgs, 40);
        assert_eq!(trimmed.len(), 4);
        assert!(trimmed[0].has_tool_calls());
    }

    #[test]
    fn orphan_tool_results_are_dropped() {
        let msgs = vec![
            Message::tool_result("ghost", "{}"),
            Message::user("hi"),
            Message::tool_result("c9", "{}"),
        ];
        let trimmed = trim_to_budget(&msgs, 1000);
        assert_eq!(trimmed.len(), 1);
        assert_eq!(trimmed[0].role, Role::User);
    }

    #[test]
    fn newest_group_kept_even_when_over_budget() {
        let msgs = vec![Message::user("old"), Message::user(&"x".repeat(400))];
        let trimmed = trim_to_budget(&msgs, 10);
        assert_eq!(trimmed.len(), 1);
        assert_eq!(trimmed[0].text().len(), 400);
    }

    #[test]
    fn empty_history() {
        assert!(trim_to_budget(&[], 100).is_empty());
    }
}
