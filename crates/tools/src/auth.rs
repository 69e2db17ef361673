//! Auth header resolution for base tools.
//!
//! - `None` → no headers
//! - `Bearer` → `Authorization: Bearer <credential>`
//! - `Custom Header` → credential parsed as a JSON object of header names to values
//!
//! Any other auth type is rejected before a request is ever built.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use toolchat_core::error::ToolError;
use toolchat_core::tool::{AuthType, BaseTool};

/// Compute the headers every request to this tool's API must carry.
pub fn auth_headers(tool: &BaseTool) -> Result<HeaderMap, ToolError> {
    let mut headers = HeaderMap::new();

    match &tool.auth_type {
        AuthType::None => {}
        AuthType::Bearer => {
            let token = credential(tool)?;
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| invalid(tool, format!("bearer token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        AuthType::CustomHeader => {
            let raw = credential(tool)?;
            let parsed: Value = serde_json::from_str(raw)
                .map_err(|e| invalid(tool, format!("custom header JSON: {e}")))?;
            let Value::Object(map) = parsed else {
                return Err(invalid(tool, "custom header credential must be a JSON object".into()));
            };

            for (name, value) in map {
                let value = match value {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(invalid(
                            tool,
                            format!("header '{name}' has non-scalar value {other}"),
                        ));
                    }
                };
                let header_name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| invalid(tool, format!("header name '{name}': {e}")))?;
                let header_value = HeaderValue::from_str(&value)
                    .map_err(|e| invalid(tool, format!("header '{name}' value: {e}")))?;
                headers.insert(header_name, header_value);
            }
        }
        AuthType::Unsupported(other) => {
            return Err(ToolError::UnsupportedAuth {
                tool: tool.name.clone(),
                auth_type: other.clone(),
            });
        }
    }

    Ok(headers)
}

fn credential(tool: &BaseTool) -> Result<&str, ToolError> {
    tool.credential
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| invalid(tool, format!("{} auth requires a credential", tool.auth_type)))
}

fn invalid(tool: &BaseTool, reason: String) -> ToolError {
    ToolError::InvalidCredential {
        tool: tool.name.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(auth: AuthType, credential: Option<&str>) -> BaseTool {
        let mut t = BaseTool::new("Weather", "{}");
        t.auth_type = auth;
        t.credential = credential.map(String::from);
        t
    }

    #[test]
    fn no_auth_no_headers() {
        let headers = auth_headers(&tool(AuthType::None, None)).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn bearer_header() {
        let headers = auth_headers(&tool(AuthType::Bearer, Some("sk-123"))).unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-123");
    }

    #[test]
    fn bearer_without_credential_fails() {
        let err = auth_headers(&tool(AuthType::Bearer, None)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn custom_header_json() {
        let headers =
            auth_headers(&tool(AuthType::CustomHeader, Some(r#"{"X-Key":"abc","X-Org":7}"#)))
                .unwrap();
        assert_eq!(headers.get("X-Key").unwrap(), "abc");
        assert_eq!(headers.get("x-org").unwrap(), "7");
    }

    #[test]
    fn custom_header_invalid_json_fails() {
        let err = auth_headers(&tool(AuthType::CustomHeader, Some("X-Key: abc"))).unwrap_err();
        assert!(matches!(err, ToolError::InvalidCredential { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn custom_header_must_be_object() {
        let err = auth_headers(&tool(AuthType::CustomHeader, Some(r#"["abc"]"#))).unwrap_err();
        assert!(matches!(err, ToolError::InvalidCredential { .. }));
    }

    #[test]
    fn unsupported_auth_fails() {
        let err = auth_headers(&tool(AuthType::Unsupported("OAuth2".into()), Some("x")))
            .unwrap_err();
        assert!(matches!(err, ToolError::UnsupportedAuth { .. }));
    }
}
