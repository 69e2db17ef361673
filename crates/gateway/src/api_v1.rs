//! HTTP API v1: chat streaming plus thread and tool management.
//!
//! Endpoints:
//!
//! - `POST /v1/chat`                  : run the responder, NDJSON stream of output chunks
//! - `POST /v1/threads`               : create a thread
//! - `GET  /v1/threads/{id}`          : get a thread
//! - `GET  /v1/threads/{id}/messages` : persisted messages of a thread
//! - `POST /v1/tools`                 : register an OpenAPI tool (validated by compiling it)
//! - `GET  /v1/tools`                 : list registered tools

use axum::{
    Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use toolchat_agent::{Responder, RunInput};
use toolchat_core::error::{Error, StoreError, ToolError};
use toolchat_core::message::{Message, Role};
use toolchat_core::store::{MessageStore, ThreadStore, ToolStore};
use toolchat_core::thread::Thread;
use toolchat_core::tool::{AuthType, BaseTool, ToolStats};
use toolchat_tools::ToolCompiler;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub responder: Responder,
    pub threads: Arc<dyn ThreadStore>,
    pub messages: Arc<dyn MessageStore>,
    pub tools: Arc<dyn ToolStore>,
    /// Client handed to the compiler when validating new tools
    pub http: reqwest::Client,
    /// Bearer tokens for API authentication. Empty means open access.
    pub bearer_tokens: Vec<String>,
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/threads", post(create_thread_handler))
        .route("/threads/{id}", get(get_thread_handler))
        .route("/threads/{id}/messages", get(list_messages_handler))
        .route("/tools", post(create_tool_handler).get(list_tools_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error with the status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => Self::new(StatusCode::NOT_FOUND, format!("{what} not found")),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl From<ToolError> for ApiError {
    fn from(e: ToolError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Store(store) => store.into(),
            Error::Tool(tool) => tool.into(),
            Error::Config { message } => Self::new(StatusCode::BAD_REQUEST, message),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = %self.status, error = %self.message, "Request failed");
        }
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ── Chat ──────────────────────────────────────────────────────────────────

/// `POST /v1/chat`: respond to a thread's history, streaming NDJSON.
///
/// Caller errors (no messages, unknown thread, misconfigured tools) are
/// answered with a plain JSON error before any streaming starts.
async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(input): Json<RunInput>,
) -> Result<Response, ApiError> {
    info!(
        thread_id = %input.thread_id,
        messages = input.messages.len(),
        save = input.save,
        "v1/chat request"
    );

    // Confirm the user turn only once nothing fatal can stop the run
    let user_turn = input
        .messages
        .last()
        .filter(|m| input.save && m.role == Role::User)
        .map(|m| m.clone().in_thread(&input.thread_id));
    let prepared = state.responder.prepare(input).await?;

    if let Some(message) = user_turn {
        if let Err(e) = state.messages.create_message(&message).await {
            warn!(message_id = %message.id, error = %e, "Failed to persist user message");
        }
    }

    let run = prepared.start();

    let lines = ReceiverStream::new(run.events).map(|chunk| chunk.to_ndjson());
    Ok((
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(lines),
    )
        .into_response())
}

// ── Threads ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub memory_enabled: bool,
    #[serde(default)]
    pub memory: String,
    #[serde(default)]
    pub memory_max_tokens: Option<usize>,
    #[serde(default)]
    pub max_input_tokens: Option<usize>,
}

async fn create_thread_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<CreateThreadRequest>,
) -> Result<(StatusCode, Json<Thread>), ApiError> {
    let mut thread = Thread::new(payload.name);
    thread.model = payload.model;
    thread.system_prompt = payload.system_prompt;
    thread.memory_enabled = payload.memory_enabled;
    thread.memory = payload.memory;
    if let Some(max) = payload.memory_max_tokens {
        thread.memory_max_tokens = max;
    }
    thread.max_input_tokens = payload.max_input_tokens;

    state.threads.create_thread(&thread).await?;
    info!(thread_id = %thread.id, "Thread created");
    Ok((StatusCode::CREATED, Json(thread)))
}

async fn get_thread_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<Thread>, ApiError> {
    let thread = state
        .threads
        .get_thread(&id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("thread {id}")))?;
    Ok(Json(thread))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageListResponse {
    pub thread_id: String,
    pub messages: Vec<Message>,
}

async fn list_messages_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<MessageListResponse>, ApiError> {
    state
        .threads
        .get_thread(&id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("thread {id}")))?;
    let messages = state.messages.list_messages(&id).await?;
    Ok(Json(MessageListResponse {
        thread_id: id,
        messages,
    }))
}

// ── Tools ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateToolRequest {
    pub name: String,
    /// OpenAPI document, JSON or YAML
    pub schema: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub credential: Option<String>,
}

/// One HTTP operation of a registered tool.
#[derive(Debug, Serialize, Deserialize)]
pub struct OperationDto {
    pub method: String,
    pub path: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

/// A registered tool, credential omitted.
#[derive(Debug, Serialize, Deserialize)]
pub struct ToolDto {
    pub id: String,
    pub name: String,
    pub description: String,
    pub auth_type: AuthType,
    pub stats: ToolStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operations: Vec<OperationDto>,
}

impl From<&BaseTool> for ToolDto {
    fn from(tool: &BaseTool) -> Self {
        Self {
            id: tool.id.clone(),
            name: tool.name.clone(),
            description: tool.description.clone(),
            auth_type: tool.auth_type.clone(),
            stats: tool.stats.clone(),
            operations: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDto>,
    pub count: usize,
}

async fn create_tool_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<CreateToolRequest>,
) -> Result<(StatusCode, Json<ToolDto>), ApiError> {
    if payload.name.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "tool name is required"));
    }

    let mut tool = BaseTool::new(payload.name, payload.schema).with_description(payload.description);
    tool.auth_type = payload.auth_type;
    tool.credential = payload.credential;

    // Reject anything the agent could not compile later
    let descriptors = ToolCompiler::new(state.http.clone()).compile(&tool)?;
    state.tools.create_tool(&tool).await?;
    info!(tool_id = %tool.id, name = %tool.name, operations = descriptors.len(), "Tool registered");

    let mut dto = ToolDto::from(&tool);
    dto.operations = descriptors
        .into_iter()
        .map(|d| OperationDto {
            method: d.method,
            path: d.path,
            description: d.description,
            operation_id: d.operation_id,
        })
        .collect();
    Ok((StatusCode::CREATED, Json(dto)))
}

async fn list_tools_handler(
    State(state): State<SharedApiState>,
) -> Result<Json<ToolListResponse>, ApiError> {
    let tools: Vec<ToolDto> = state.tools.list_tools().await?.iter().map(ToolDto::from).collect();
    let count = tools.len();
    Ok(Json(ToolListResponse { tools, count }))
}
