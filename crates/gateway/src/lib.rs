//! HTTP API gateway for toolchat.
//!
//! Exposes the responder over HTTP: an NDJSON chat stream plus thread
//! and tool management, and a health check.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use toolchat_agent::{Responder, ResponderConfig};
use toolchat_config::{AppConfig, StoreBackend};
use toolchat_core::store::{MessageStore, ThreadStore, ToolStore};
use toolchat_store::{InMemoryStore, SqliteStore};

pub use api_v1::{ApiV1State, SharedApiState};

/// Tool documents can be large; chat histories larger still.
const BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Build the full router: `/health` plus the v1 API.
///
/// Layers applied:
/// - Bearer token authentication on all /v1 routes
/// - CORS restricted to the configured origins
/// - Request body size limit
/// - HTTP trace logging
pub fn build_router(state: SharedApiState, cors_origins: &[String]) -> Router {
    let v1 = api_v1::v1_router(state.clone())
        .layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors_layer(cors_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Open the configured stores. One object serves all three store traits.
pub async fn open_stores(
    config: &AppConfig,
) -> Result<(Arc<dyn ThreadStore>, Arc<dyn MessageStore>, Arc<dyn ToolStore>), Box<dyn std::error::Error>>
{
    match config.store.backend {
        StoreBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            Ok((store.clone(), store.clone(), store))
        }
        StoreBackend::Sqlite => {
            let path = config.store.database_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let url = format!("sqlite://{}", path.display());
            let store = Arc::new(SqliteStore::new(&url).await?);
            Ok((store.clone(), store.clone(), store))
        }
    }
}

/// Build the API state from configuration: provider, stores and responder.
pub async fn build_state(config: &AppConfig) -> Result<SharedApiState, Box<dyn std::error::Error>> {
    let router = toolchat_providers::build_from_config(config);
    let provider = router
        .default()
        .ok_or("No default provider configured, set an API key")?;

    let (threads, messages, tools) = open_stores(config).await?;
    let http = reqwest::Client::new();

    let responder = Responder::new(provider, threads.clone(), messages.clone(), tools.clone())
        .with_config(ResponderConfig::from_app_config(config))
        .with_http_client(http.clone());

    Ok(Arc::new(ApiV1State {
        responder,
        threads,
        messages,
        tools,
        http,
        bearer_tokens: config.gateway.bearer_tokens.clone(),
    }))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(&config).await?;

    if state.bearer_tokens.is_empty() {
        warn!("No bearer tokens configured, the API is open to anyone who can reach it");
    }

    let app = build_router(state, &config.gateway.cors_origins);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Authentication middleware for the /v1 API.
///
/// Requires `Authorization: Bearer <token>` when tokens are configured.
async fn auth_middleware(
    State(state): State<SharedApiState>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if state.bearer_tokens.is_empty() {
        return Ok(next.run(req).await);
    }

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match auth_header {
        Some(token) if state.bearer_tokens.iter().any(|t| t == token) => Ok(next.run(req).await),
        _ => {
            warn!("Unauthorized request to /v1 API, missing or invalid bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
