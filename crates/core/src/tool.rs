//! Tool types: registered external APIs and the callable descriptors
//! compiled from them.
//!
//! A [`BaseTool`] is what the user registers: an OpenAPI document plus a
//! credential. Compiling it yields one [`ToolDescriptor`] per HTTP operation.
//! Descriptors for one agent run live in a [`ToolSet`] that the run owns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::message::ToolCallMetadata;
use crate::provider::ToolDefinition;

/// How a base tool authenticates against its API.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthType {
    #[default]
    None,
    Bearer,
    CustomHeader,
    /// Anything else. Rejected when the tool is compiled.
    Unsupported(String),
}

impl AuthType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "None",
            Self::Bearer => "Bearer",
            Self::CustomHeader => "Custom Header",
            Self::Unsupported(s) => s,
        }
    }
}

impl From<String> for AuthType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "None" | "" => Self::None,
            "Bearer" => Self::Bearer,
            "Custom Header" => Self::CustomHeader,
            _ => Self::Unsupported(s),
        }
    }
}

impl From<AuthType> for String {
    fn from(auth: AuthType) -> Self {
        auth.as_str().to_string()
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution statistics kept per base tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolStats {
    pub count: u64,
    pub success_count: u64,
    pub avg_latency_ms: f64,
}

impl ToolStats {
    /// Fold one execution into the running statistics.
    pub fn record(&mut self, latency_ms: u64, success: bool) {
        let total = self.avg_latency_ms * self.count as f64 + latency_ms as f64;
        self.count += 1;
        if success {
            self.success_count += 1;
        }
        self.avg_latency_ms = total / self.count as f64;
    }
}

/// A user-registered external API.
#[derive(Clone, Serialize, Deserialize)]
pub struct BaseTool {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Raw OpenAPI document, JSON or YAML
    pub schema: String,

    #[serde(default)]
    pub auth_type: AuthType,

    /// Bearer token, or a JSON object of headers for `Custom Header`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,

    #[serde(default)]
    pub stats: ToolStats,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl BaseTool {
    pub fn new(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            schema: schema.into(),
            auth_type: AuthType::None,
            credential: None,
            stats: ToolStats::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_auth(mut self, auth_type: AuthType, credential: impl Into<String>) -> Self {
        self.auth_type = auth_type;
        self.credential = Some(credential.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl fmt::Debug for BaseTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseTool")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("auth_type", &self.auth_type)
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("stats", &self.stats)
            .finish()
    }
}

/// Something that can run a tool call given its raw JSON argument string.
///
/// Failures are data: implementations return an error-shaped value
/// (`{"error": ...}`) instead of failing, so the model can react to it.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: &str) -> serde_json::Value;
}

/// One callable operation derived from a base tool's OpenAPI document.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Opaque generated name the model calls the tool by
    pub name: String,

    /// `"{METHOD} {PATH}: {summary}"`
    pub description: String,

    /// JSON Schema of the merged parameters
    pub parameters: serde_json::Value,

    /// Upper-case HTTP method
    pub method: String,

    /// Path template, e.g. `/users/{userId}`
    pub path: String,

    pub operation_id: Option<String>,

    pub base_tool_id: String,

    pub base_tool_name: String,

    pub executor: Arc<dyn ToolExecutor>,
}

impl ToolDescriptor {
    /// The signature offered to the model.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Audit metadata for persisted tool calls.
    pub fn metadata(&self) -> ToolCallMetadata {
        ToolCallMetadata {
            tool_id: self.base_tool_id.clone(),
            tool_name: self.base_tool_name.clone(),
            method: self.method.clone(),
            path: self.path.clone(),
            operation_id: self.operation_id.clone(),
        }
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("base_tool_name", &self.base_tool_name)
            .finish()
    }
}

/// The active tool set of a single agent run, keyed by descriptor name.
///
/// Built fresh for every run and never shared between runs.
#[derive(Debug, Default, Clone)]
pub struct ToolSet {
    order: Vec<String>,
    tools: HashMap<String, Arc<ToolDescriptor>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Returns `false` (and keeps the existing one) on a name clash.
    pub fn insert(&mut self, descriptor: ToolDescriptor) -> bool {
        if self.tools.contains_key(&descriptor.name) {
            return false;
        }
        self.order.push(descriptor.name.clone());
        self.tools
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Signatures in insertion order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|d| d.definition())
            .collect()
    }

    /// Descriptor metadata keyed by name, detached from the executors.
    pub fn metadata(&self) -> HashMap<String, ToolCallMetadata> {
        self.tools
            .iter()
            .map(|(name, d)| (name.clone(), d.metadata()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoExecutor;

    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, arguments: &str) -> serde_json::Value {
            serde_json::from_str(arguments).unwrap_or(serde_json::Value::Null)
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.into(),
            description: "GET /echo: Echo".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            method: "GET".into(),
            path: "/echo".into(),
            operation_id: Some("echo".into()),
            base_tool_id: "tool-1".into(),
            base_tool_name: "Echo API".into(),
            executor: Arc::new(EchoExecutor),
        }
    }

    #[test]
    fn auth_type_wire_names() {
        let auth: AuthType = serde_json::from_str("\"Custom Header\"").unwrap();
        assert_eq!(auth, AuthType::CustomHeader);
        let auth: AuthType = serde_json::from_str("\"OAuth2\"").unwrap();
        assert_eq!(auth, AuthType::Unsupported("OAuth2".into()));
        assert_eq!(
            serde_json::to_string(&AuthType::Bearer).unwrap(),
            "\"Bearer\""
        );
    }

    #[test]
    fn stats_running_average() {
        let mut stats = ToolStats::default();
        stats.record(100, true);
        stats.record(300, false);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.success_count, 1);
        assert!((stats.avg_latency_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn toolset_rejects_duplicate_names() {
        let mut set = ToolSet::new();
        assert!(set.insert(descriptor("abc")));
        assert!(!set.insert(descriptor("abc")));
        assert!(set.insert(descriptor("xyz")));
        assert_eq!(set.len(), 2);
        let names: Vec<_> = set.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["abc", "xyz"]);
    }

    #[test]
    fn descriptor_metadata() {
        let meta = descriptor("abc").metadata();
        assert_eq!(meta.tool_name, "Echo API");
        assert_eq!(meta.method, "GET");
        assert_eq!(meta.operation_id.as_deref(), Some("echo"));
    }

    #[tokio::test]
    async fn executor_through_set() {
        let mut set = ToolSet::new();
        set.insert(descriptor("abc"));
        let d = set.get("abc").unwrap();
        let out = d.executor.execute(r#"{"x":1}"#).await;
        assert_eq!(out["x"], 1);
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn base_tool_debug_redacts_credential() {
        let tool = BaseTool::new("Weather", "{}").with_auth(AuthType::Bearer, "sk-secret");
        let dbg = format!("{tool:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("REDACTED"));
    }
}
