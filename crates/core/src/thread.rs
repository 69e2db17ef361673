//! Thread: a persisted conversation context with its own model,
//! prompt, memory and token configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation context owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Model selection; `None` falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Whether `memory` is injected into every request
    #[serde(default)]
    pub memory_enabled: bool,

    #[serde(default)]
    pub memory: String,

    /// Token budget for the injected memory block
    #[serde(default = "default_memory_max_tokens")]
    pub memory_max_tokens: usize,

    /// Upper bound on the trimmed history sent to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_input_tokens: Option<usize>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_memory_max_tokens() -> usize {
    512
}

impl Thread {
    /// Create a thread with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            model: None,
            system_prompt: None,
            memory_enabled: false,
            memory: String::new(),
            memory_max_tokens: default_memory_max_tokens(),
            max_input_tokens: None,
            created_at: Utc::now(),
        }
    }

    /// The memory text to inject, if the toggle is on and there is any.
    pub fn active_memory(&self) -> Option<&str> {
        (self.memory_enabled && !self.memory.trim().is_empty()).then_some(self.memory.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_thread_deserializes_with_defaults() {
        let thread: Thread = serde_json::from_str(r#"{"id":"t1"}"#).unwrap();
        assert_eq!(thread.id, "t1");
        assert_eq!(thread.memory_max_tokens, 512);
        assert!(thread.max_input_tokens.is_none());
        assert!(!thread.memory_enabled);
    }

    #[test]
    fn memory_only_active_when_enabled() {
        let mut thread = Thread::new("weather");
        thread.memory = "User lives in Tokyo".into();
        assert!(thread.active_memory().is_none());
        thread.memory_enabled = true;
        assert_eq!(thread.active_memory(), Some("User lives in Tokyo"));
        thread.memory = "   ".into();
        assert!(thread.active_memory().is_none());
    }
}
