//! OpenAPI document loading.
//!
//! Parses a stored document (JSON first, YAML as a fallback), inlines every
//! internal `$ref`, and resolves the base server URL.

use std::collections::HashMap;

use serde_json::{Map, Value};
use toolchat_core::error::ToolError;
use tracing::trace;

/// Parse a raw OpenAPI document into a JSON value.
///
/// JSON is attempted first; anything that fails to parse as JSON is retried
/// as YAML. The document root must be an object.
pub fn parse(tool: &str, raw: &str) -> Result<Value, ToolError> {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(json_err) => {
            trace!(tool, error = %json_err, "Document is not JSON, trying YAML");
            serde_yaml::from_str::<Value>(raw).map_err(|e| ToolError::InvalidSchema {
                tool: tool.to_string(),
                reason: format!("neither JSON ({json_err}) nor YAML ({e})"),
            })?
        }
    };

    if !value.is_object() {
        return Err(ToolError::InvalidSchema {
            tool: tool.to_string(),
            reason: "document root is not an object".into(),
        });
    }
    Ok(value)
}

/// Return a copy of `root` with every internal `$ref` replaced by its target.
///
/// Only same-document references (`#/...`) are supported. Cyclic references
/// are rejected rather than expanded forever.
pub fn resolve_refs(tool: &str, root: &Value) -> Result<Value, ToolError> {
    RefResolver::new(tool, root).inline(root)
}

/// Inlines references, resolving each distinct target once.
struct RefResolver<'a> {
    tool: &'a str,
    root: &'a Value,
    stack: Vec<String>,
    resolved: HashMap<String, Value>,
}

impl<'a> RefResolver<'a> {
    fn new(tool: &'a str, root: &'a Value) -> Self {
        Self {
            tool,
            root,
            stack: Vec::new(),
            resolved: HashMap::new(),
        }
    }

    fn inline(&mut self, value: &Value) -> Result<Value, ToolError> {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    let mut resolved = self.target(reference)?;

                    // Sibling keys next to a $ref (e.g. a local description) win.
                    if let Value::Object(resolved_map) = &mut resolved {
                        for (k, v) in map.iter().filter(|(k, _)| k.as_str() != "$ref") {
                            resolved_map.insert(k.clone(), self.inline(v)?);
                        }
                    }
                    return Ok(resolved);
                }

                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.inline(v)?);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => items
                .iter()
                .map(|v| self.inline(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    /// The fully inlined target of `reference`.
    fn target(&mut self, reference: &str) -> Result<Value, ToolError> {
        if let Some(done) = self.resolved.get(reference) {
            return Ok(done.clone());
        }
        if self.stack.iter().any(|r| r == reference) {
            return Err(unresolved(self.tool, reference, "cyclic reference"));
        }

        let target = lookup(self.tool, self.root, reference)?;
        self.stack.push(reference.to_string());
        let resolved = self.inline(target)?;
        self.stack.pop();

        self.resolved.insert(reference.to_string(), resolved.clone());
        Ok(resolved)
    }
}

fn lookup<'a>(tool: &str, root: &'a Value, reference: &str) -> Result<&'a Value, ToolError> {
    let Some(fragment) = reference.strip_prefix('#') else {
        return Err(unresolved(tool, reference, "external references are not supported"));
    };
    let pointer = urlencoding::decode(fragment)
        .map_err(|e| unresolved(tool, reference, &e.to_string()))?;
    root.pointer(&pointer)
        .ok_or_else(|| unresolved(tool, reference, "target does not exist"))
}

fn unresolved(tool: &str, reference: &str, reason: &str) -> ToolError {
    ToolError::UnresolvedReference {
        tool: tool.to_string(),
        reference: reference.to_string(),
        reason: reason.to_string(),
    }
}

/// The first declared server URL, with server variables set to their defaults.
pub fn server_url(tool: &str, root: &Value) -> Result<String, ToolError> {
    let server = root
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .ok_or_else(|| ToolError::MissingServer(tool.to_string()))?;

    let mut url = server
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ToolError::MissingServer(tool.to_string()))?
        .to_string();

    if let Some(variables) = server.get("variables").and_then(Value::as_object) {
        for (name, var) in variables {
            if let Some(default) = var.get("default").and_then(Value::as_str) {
                url = url.replace(&format!("{{{name}}}"), default);
            }
        }
    }

    Ok(url.trim_end_matches('/').to_string())
}
