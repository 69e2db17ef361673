//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token.
//! Close enough for BPE tokenizers on English text, and keeps budget
//! arithmetic predictable in tests.

use toolchat_core::message::Message;

/// Per-message overhead for role name, delimiters and wire formatting.
const MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Tool calls count by function name and raw argument string.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let calls: usize = message
        .tool_calls
        .iter()
        .map(|tc| estimate_tokens(&tc.function.name) + estimate_tokens(&tc.function.arguments))
        .sum();
    MESSAGE_OVERHEAD + estimate_tokens(message.text()) + calls
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Cut `text` down to roughly `max_tokens`, on a char boundary.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> &str {
    let max_bytes = max_tokens.saturating_mul(4);
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
