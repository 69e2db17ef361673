//! HTTP executor bound to one OpenAPI operation.
//!
//! Execution never fails: transport errors, non-2xx responses and bad
//! arguments all come back as `{"error": ...}` values so they can be fed
//! to the model as an ordinary tool result.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method};
use serde_json::{Map, Value, json};
use toolchat_core::tool::ToolExecutor;
use tracing::{debug, warn};

/// Calls `{server_url}/{path}` with the operation's method and auth headers.
#[derive(Debug, Clone)]
pub struct HttpToolExecutor {
    client: Client,
    method: Method,
    server_url: String,
    path: String,
    headers: HeaderMap,
}

impl HttpToolExecutor {
    pub fn new(
        client: Client,
        method: Method,
        server_url: impl Into<String>,
        path: impl Into<String>,
        headers: HeaderMap,
    ) -> Self {
        Self {
            client,
            method,
            server_url: server_url.into(),
            path: path.into(),
            headers,
        }
    }

    /// Substitute `{name}` placeholders from `args`, removing each used key.
    fn render_path(&self, args: &mut Map<String, Value>) -> String {
        let mut path = self.path.clone();
        for name in path_variables(&self.path) {
            if let Some(value) = args.remove(&name) {
                let raw = scalar_to_string(&value);
                path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(&raw));
            }
        }
        path
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.server_url, path.trim_start_matches('/'))
    }

    fn sends_query(&self) -> bool {
        self.method == Method::GET || self.method == Method::DELETE
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    async fn execute(&self, arguments: &str) -> Value {
        let mut args = match parse_arguments(arguments) {
            Ok(args) => args,
            Err(message) => return json!({ "error": message }),
        };

        let path = self.render_path(&mut args);
        let url = self.url(&path);

        let mut headers = self.headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut request = self
            .client
            .request(self.method.clone(), &url)
            .headers(headers);

        if self.sends_query() {
            let query: Vec<(String, String)> = args
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), scalar_to_string(v)))
                .collect();
            if !query.is_empty() {
                request = request.query(&query);
            }
        } else {
            request = request.json(&Value::Object(args));
        }

        debug!(method = %self.method, url = %url, "Executing tool call");

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(method = %self.method, url = %url, error = %e, "Tool request failed");
                return json!({ "error": e.to_string() });
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => return json!({ "error": format!("Failed to read response body: {e}") }),
        };
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            warn!(method = %self.method, url = %url, status = status.as_u16(), "Tool returned an error status");
            return json!({
                "error": format!("Request failed with status code {}", status.as_u16()),
                "status": status.as_u16(),
                "body": body,
            });
        }

        body
    }
}

fn parse_arguments(arguments: &str) -> Result<Map<String, Value>, String> {
    if arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(format!("Tool arguments must be a JSON object, got {other}")),
        Err(e) => Err(format!("Invalid tool arguments: {e}")),
    }
}

/// Names of the `{placeholders}` in a path template, in order.
pub fn path_variables(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else { break };
        let name = &after[..end];
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
