//! Compiles a [`BaseTool`]'s OpenAPI document into callable descriptors.
//!
//! One descriptor per path × method operation. Each gets an opaque random
//! name that is unique within the compiler, so a compiler should live exactly
//! as long as one agent run's tool set.

use rand::Rng;
use rand::distr::Alphanumeric;
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use toolchat_core::error::ToolError;
use toolchat_core::tool::{BaseTool, ToolDescriptor};
use tracing::{debug, trace};

use crate::auth::auth_headers;
use crate::document;
use crate::executor::HttpToolExecutor;

const HTTP_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

const NAME_LEN: usize = 10;

const PRIMITIVE_TYPES: [&str; 4] = ["string", "number", "integer", "boolean"];

/// Per-run tool compiler. Tracks generated names to keep them collision-free.
#[derive(Debug, Clone)]
pub struct ToolCompiler {
    client: Client,
    names: HashSet<String>,
}

impl Default for ToolCompiler {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl ToolCompiler {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            names: HashSet::new(),
        }
    }

    /// Compile every operation of `tool`. All-or-nothing: any failure
    /// returns an error and no descriptors.
    pub fn compile(&mut self, tool: &BaseTool) -> Result<Vec<ToolDescriptor>, ToolError> {
        let raw = document::parse(&tool.name, &tool.schema)?;
        let doc = document::resolve_refs(&tool.name, &raw)?;
        let server_url = document::server_url(&tool.name, &doc)?;
        let headers = auth_headers(tool)?;

        let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
            debug!(tool = %tool.name, "Document declares no paths");
            return Ok(Vec::new());
        };

        let mut descriptors = Vec::new();
        let mut reserved = Vec::new();

        for (path, item) in paths {
            let Some(item) = item.as_object() else { continue };
            let shared_params = item.get("parameters").and_then(Value::as_array);

            for (key, operation) in item {
                let Some(http_method) = HTTP_METHODS
                    .iter()
                    .find(|m| m.eq_ignore_ascii_case(key))
                else {
                    continue;
                };
                if operation.get("responses").is_none() {
                    trace!(tool = %tool.name, path, method = key.as_str(), "Skipping entry without responses");
                    continue;
                }

                let method = Method::from_bytes(http_method.to_ascii_uppercase().as_bytes())
                    .map_err(|e| ToolError::InvalidSchema {
                        tool: tool.name.clone(),
                        reason: e.to_string(),
                    })?;

                let name = self.fresh_name(&reserved);
                reserved.push(name.clone());

                let executor = HttpToolExecutor::new(
                    self.client.clone(),
                    method.clone(),
                    server_url.clone(),
                    path.clone(),
                    headers.clone(),
                );

                descriptors.push(ToolDescriptor {
                    name,
                    description: describe(method.as_str(), path, operation),
                    parameters: parameter_schema(shared_params, operation),
                    method: method.to_string(),
                    path: path.clone(),
                    operation_id: operation
                        .get("operationId")
                        .and_then(Value::as_str)
                        .map(String::from),
                    base_tool_id: tool.id.clone(),
                    base_tool_name: tool.name.clone(),
                    executor: Arc::new(executor),
                });
            }
        }

        // Only commit names once the whole tool compiled.
        self.names.extend(reserved);

        debug!(tool = %tool.name, operations = descriptors.len(), "Compiled tool");
        Ok(descriptors)
    }

    fn fresh_name(&self, pending: &[String]) -> String {
        loop {
            let candidate: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(NAME_LEN)
                .map(char::from)
                .collect();
            if !self.names.contains(&candidate) && !pending.contains(&candidate) {
                return candidate;
            }
        }
    }
}

fn describe(method: &str, path: &str, operation: &Value) -> String {
    let summary = operation
        .get("summary")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| operation.get("description").and_then(Value::as_str))
        .unwrap_or("");
    format!("{method} {path}: {summary}")
}

/// Merge primitive parameters and the JSON request body into one object schema.
///
/// Path-level parameters apply first; an operation parameter with the same
/// name replaces it.
fn parameter_schema(shared: Option<&Vec<Value>>, operation: &Value) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    let op_params = operation.get("parameters").and_then(Value::as_array);
    let all = shared.into_iter().flatten().chain(op_params.into_iter().flatten());

    for param in all {
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(schema) = param.get("schema").and_then(Value::as_object) else {
            continue;
        };
        let is_primitive = schema
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| PRIMITIVE_TYPES.contains(&t));
        if !is_primitive {
            continue;
        }

        let mut prop = schema.clone();
        if let Some(desc) = param.get("description").and_then(Value::as_str) {
            prop.entry("description")
                .or_insert_with(|| Value::String(desc.to_string()));
        }
        properties.insert(name.to_string(), Value::Object(prop));

        let is_required = param.get("required").and_then(Value::as_bool).unwrap_or(false);
        required.retain(|r| r != name);
        if is_required {
            required.push(name.to_string());
        }
    }

    if let Some(body) = operation
        .pointer("/requestBody/content/application~1json/schema")
        .and_then(Value::as_object)
    {
        if let Some(body_props) = body.get("properties").and_then(Value::as_object) {
            for (k, v) in body_props {
                properties.insert(k.clone(), v.clone());
            }
        }
        if let Some(body_required) = body.get("required").and_then(Value::as_array) {
            for r in body_required.iter().filter_map(Value::as_str) {
                if !required.iter().any(|x| x == r) {
                    required.push(r.to_string());
                }
            }
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
