//! End-to-end integration tests for toolchat.
//!
//! These exercise the full pipeline through the HTTP gateway: tool
//! registration, thread creation, a streamed chat turn that calls a real
//! (mocked) HTTP API, and the persisted result in SQLite.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use toolchat_agent::{Responder, ResponderConfig};
use toolchat_core::error::ProviderError;
use toolchat_core::provider::{
    ChunkReceiver, FinishReason, FunctionDelta, MessageDelta, Provider, ProviderRequest,
    StreamChunk, ToolCallDelta,
};
use toolchat_gateway::{ApiV1State, build_router};
use toolchat_store::SqliteStore;

// ── Mock Provider ────────────────────────────────────────────────────────

type Script = Box<dyn Fn(&ProviderRequest, usize) -> Vec<StreamChunk> + Send + Sync>;

/// A mock provider that streams scripted fragments and records requests.
struct ScriptedProvider {
    script: Script,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(script: impl Fn(&ProviderRequest, usize) -> Vec<StreamChunk> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let step = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        let chunks = (self.script)(&request, step);
        let (tx, rx) = tokio::sync::mpsc::channel(chunks.len() + 1);
        for chunk in chunks {
            tx.try_send(Ok(chunk)).unwrap();
        }
        Ok(rx)
    }
}

fn tool_call(index: usize, id: &str, name: &str, args: &str) -> StreamChunk {
    StreamChunk {
        delta: MessageDelta {
            tool_calls: vec![ToolCallDelta {
                index: Some(index),
                id: Some(id.into()),
                kind: Some("function".into()),
                function: Some(FunctionDelta {
                    name: Some(name.into()),
                    arguments: Some(args.into()),
                }),
            }],
            ..MessageDelta::default()
        },
        ..StreamChunk::default()
    }
}

fn weather_doc(server: &str) -> String {
    format!(
        r#"
openapi: 3.0.0
info:
  title: Weather
  version: "1"
servers:
  - url: {server}
paths:
  /weather/{{city}}:
    get:
      operationId: get_current_weather
      summary: Current weather for a city
      parameters:
        - name: city
          in: path
          required: true
          schema:
            type: string
      responses:
        "200":
          description: ok
"#
    )
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    app: axum::Router,
    _db: tempfile::TempDir,
}

impl Harness {
    async fn new(provider: Arc<ScriptedProvider>) -> Self {
        let db = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", db.path().join("toolchat.db").display());
        let store = Arc::new(SqliteStore::new(&url).await.unwrap());

        let responder = Responder::new(provider, store.clone(), store.clone(), store.clone())
            .with_config(ResponderConfig::default());
        let state = Arc::new(ApiV1State {
            responder,
            threads: store.clone(),
            messages: store.clone(),
            tools: store,
            http: reqwest::Client::new(),
            bearer_tokens: Vec::new(),
        });

        Self {
            app: build_router(state, &[]),
            _db: db,
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn json(&self, method: &str, uri: &str, body: Option<Value>) -> Value {
        let (status, bytes) = self.send(method, uri, body).await;
        assert!(status.is_success(), "{method} {uri} failed with {status}");
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Poll until the thread holds `count` messages.
    async fn wait_for_messages(&self, thread_id: &str, count: usize) -> Vec<Value> {
        for _ in 0..100 {
            let list = self
                .json("GET", &format!("/v1/threads/{thread_id}/messages"), None)
                .await;
            let messages = list["messages"].as_array().unwrap().clone();
            if messages.len() >= count {
                return messages;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("thread {thread_id} never reached {count} messages");
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_weather_question_through_gateway() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/Tokyo"))
        .and(header("authorization", "Bearer wx-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp": "20C"})))
        .expect(1)
        .mount(&api)
        .await;

    let provider = Arc::new(ScriptedProvider::new(|request, step| match step {
        0 => {
            let name = request.tools[0].name.clone();
            vec![
                tool_call(0, "call_1", &name, r#"{"city":"#),
                StreamChunk {
                    delta: MessageDelta {
                        tool_calls: vec![ToolCallDelta {
                            index: Some(0),
                            function: Some(FunctionDelta {
                                name: None,
                                arguments: Some(r#""Tokyo"}"#.into()),
                            }),
                            ..ToolCallDelta::default()
                        }],
                        ..MessageDelta::default()
                    },
                    ..StreamChunk::default()
                },
                StreamChunk::finish(FinishReason::ToolCalls),
            ]
        }
        _ => vec![
            StreamChunk::text("Sunny, "),
            StreamChunk::text("20C in Tokyo."),
            StreamChunk::finish(FinishReason::Stop),
        ],
    }));
    let h = Harness::new(provider.clone()).await;

    let tool = h
        .json(
            "POST",
            "/v1/tools",
            Some(json!({
                "name": "Weather",
                "description": "Current weather by city",
                "schema": weather_doc(&api.uri()),
                "auth_type": "Bearer",
                "credential": "wx-key"
            })),
        )
        .await;
    let tool_id = tool["id"].as_str().unwrap().to_string();

    let thread = h
        .json("POST", "/v1/threads", Some(json!({ "name": "Travel" })))
        .await;
    let thread_id = thread["id"].as_str().unwrap().to_string();

    let (status, body) = h
        .send(
            "POST",
            "/v1/chat",
            Some(json!({
                "thread_id": thread_id,
                "messages": [{ "id": "u1", "role": "user", "content": "What's the weather in Tokyo?" }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let chunks: Vec<Value> = String::from_utf8(body)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let tool_result = chunks.iter().find(|c| c["role"] == "tool").unwrap();
    assert_eq!(tool_result["tool_call_id"], "call_1");
    assert_eq!(tool_result["content"], r#"{"temp":"20C"}"#);
    let answer: String = chunks
        .iter()
        .filter(|c| c["role"] != "tool")
        .filter_map(|c| c["content"].as_str())
        .collect();
    assert_eq!(answer, "Sunny, 20C in Tokyo.");

    // The model saw the tool result on its second step
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.last().unwrap().text(), r#"{"temp":"20C"}"#);

    // user + assistant(tool call) + tool + assistant(answer)
    let saved = h.wait_for_messages(&thread_id, 4).await;
    let roles: Vec<_> = saved.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
    assert_eq!(saved[0]["id"], "u1");
    assert_eq!(
        saved[1]["tool_calls"][0]["metadata"]["operation_id"],
        "get_current_weather"
    );
    assert_eq!(saved[1]["tool_calls"][0]["metadata"]["tool_id"], tool_id.as_str());

    // Stats are recorded after the stream closes
    let mut calls = 0;
    for _ in 0..100 {
        let list = h.json("GET", "/v1/tools", None).await;
        calls = list["tools"][0]["stats"]["count"].as_u64().unwrap();
        if calls == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn e2e_parallel_calls_keep_call_order() {
    let api = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather/Slowtown"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"city": "Slowtown"}))
                .set_delay(std::time::Duration::from_millis(200)),
        )
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/weather/Quickville"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"city": "Quickville"})))
        .mount(&api)
        .await;

    let provider = Arc::new(ScriptedProvider::new(|request, step| match step {
        0 => {
            let name = request.tools[0].name.clone();
            vec![
                tool_call(0, "call_slow", &name, r#"{"city":"Slowtown"}"#),
                tool_call(1, "call_quick", &name, r#"{"city":"Quickville"}"#),
                StreamChunk::finish(FinishReason::ToolCalls),
            ]
        }
        _ => vec![StreamChunk::text("Done."), StreamChunk::finish(FinishReason::Stop)],
    }));
    let h = Harness::new(provider).await;

    h.json(
        "POST",
        "/v1/tools",
        Some(json!({ "name": "Weather", "schema": weather_doc(&api.uri()) })),
    )
    .await;
    let thread = h.json("POST", "/v1/threads", Some(json!({}))).await;

    let (_, body) = h
        .send(
            "POST",
            "/v1/chat",
            Some(json!({
                "thread_id": thread["id"],
                "save": false,
                "messages": [{ "role": "user", "content": "Weather in Slowtown and Quickville?" }]
            })),
        )
        .await;

    let results: Vec<Value> = String::from_utf8(body)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str::<Value>(l).unwrap())
        .filter(|c| c["role"] == "tool")
        .collect();
    let ids: Vec<_> = results
        .iter()
        .map(|r| r["tool_call_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["call_slow", "call_quick"]);
}

#[tokio::test]
async fn e2e_unknown_thread_and_empty_history() {
    let provider = Arc::new(ScriptedProvider::new(|_, _| Vec::new()));
    let h = Harness::new(provider.clone()).await;

    let (status, _) = h
        .send(
            "POST",
            "/v1/chat",
            Some(json!({ "thread_id": "nope", "messages": [{ "role": "user", "content": "hi" }] })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let thread = h.json("POST", "/v1/threads", Some(json!({}))).await;
    let (status, _) = h
        .send(
            "POST",
            "/v1/chat",
            Some(json!({ "thread_id": thread["id"], "messages": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(provider.requests().is_empty());
}
