use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{MatchedPath, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, ConfigError};
use crate::keepalive::{probe_for, run_keepalive, DatabaseProbe};
use crate::provider::azure_openai::AzureOpenAiProvider;
use crate::provider::ChatCompletionProvider;
use crate::relay::{validate_message, ChatRelay, RelayProfile};
use crate::service::cors::{policy_for_path, CorsGate, CHAT_CORS, DATABASE_CORS};
use crate::types::{ChatEnvelope, ChatRequest};

/// Shared application state for the HTTP API.
///
/// Built once per process. Backends are absent when their credentials are
/// missing; the affected routes then answer 500 naming the missing variable.
pub struct AppState {
    pub config: Config,
    pub cors: CorsGate,
    provider: Option<Arc<dyn ChatCompletionProvider>>,
    probe: Option<Arc<dyn DatabaseProbe>>,
}

impl AppState {
    /// Create AppState with backends auto-configured from config.
    pub fn from_config(config: Config) -> Self {
        let provider = match config.chat.validate() {
            Ok(()) => Some(Arc::new(AzureOpenAiProvider::new(&config.chat)) as Arc<dyn ChatCompletionProvider>),
            Err(e) => {
                warn!("Chat service not configured: {}", e);
                None
            }
        };
        let probe = match config.database.validate() {
            Ok(()) => Some(probe_for(&config.database)),
            Err(e) => {
                warn!("Database not configured: {}", e);
                None
            }
        };
        Self::with_backends(config, provider, probe)
    }

    /// Create AppState with explicit backends.
    pub fn with_backends(
        config: Config,
        provider: Option<Arc<dyn ChatCompletionProvider>>,
        probe: Option<Arc<dyn DatabaseProbe>>,
    ) -> Self {
        let cors = CorsGate::new(config.cors.allowed_origins.clone());
        Self {
            config,
            cors,
            provider,
            probe,
        }
    }

    /// Chat relay for one invocation with the given profile.
    pub fn relay(&self, profile: RelayProfile) -> Result<ChatRelay, AppError> {
        let provider = match self.provider {
            Some(ref p) => p.clone(),
            None => {
                self.config.chat.validate()?;
                return Err(ConfigError::Invalid("chat service unavailable".to_string()).into());
            }
        };
        let timezone = self.config.relay.timezone()?;
        Ok(ChatRelay::new(provider, profile, timezone))
    }

    /// Database probe for one invocation.
    pub fn probe(&self) -> Result<Arc<dyn DatabaseProbe>, AppError> {
        match self.probe {
            Some(ref p) => Ok(p.clone()),
            None => {
                self.config.database.validate()?;
                Err(ConfigError::Invalid("database unavailable".to_string()).into())
            }
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Chat relay
        .route(
            "/api/aiHttpTrigger",
            post(handle_chat_assistant).options(handle_chat_preflight),
        )
        .route(
            "/api/httpTriggerAi",
            post(handle_chat_strict).options(handle_chat_preflight),
        )
        // Database keep-alive
        .route(
            "/api/httpTriggerDb",
            get(handle_db_keepalive).options(handle_db_preflight),
        )
        .route(
            "/api/httpTriggerDbConnection",
            get(handle_db_keepalive).options(handle_db_preflight),
        )
        // Health
        .route("/health", get(handle_health))
        .method_not_allowed_fallback(handle_method_not_allowed)
        .fallback(handle_not_found)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /api/aiHttpTrigger
async fn handle_chat_assistant(
    State(state): State<Arc<AppState>>,
    path: MatchedPath,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay_chat(&state, path.as_str(), &headers, &body, RelayProfile::assistant()).await
}

/// POST /api/httpTriggerAi
async fn handle_chat_strict(
    State(state): State<Arc<AppState>>,
    path: MatchedPath,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    relay_chat(&state, path.as_str(), &headers, &body, RelayProfile::strict()).await
}

async fn handle_chat_preflight(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    state.cors.preflight(&headers, &CHAT_CORS)
}

async fn handle_db_preflight(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    state.cors.preflight(&headers, &DATABASE_CORS)
}

async fn relay_chat(
    state: &AppState,
    route: &str,
    headers: &HeaderMap,
    body: &[u8],
    profile: RelayProfile,
) -> Response {
    let span = info_span!("invocation", id = %Uuid::new_v4(), route = %route);
    async move {
        info!("Http function processed request for url \"{}\"", route);
        let cors = state.cors.headers(headers, &CHAT_CORS);

        let request: ChatRequest = match serde_json::from_slice(body) {
            Ok(r) => r,
            Err(e) => {
                warn!("Unreadable chat body: {}", e);
                ChatRequest::default()
            }
        };

        let result = match validate_message(request.message.as_deref()) {
            Ok(message) => match state.relay(profile) {
                Ok(relay) => relay.relay(Some(message)).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => (StatusCode::OK, cors, Json(ChatEnvelope { response: reply })).into_response(),
            Err(AppError::InvalidRequest(msg)) => (StatusCode::BAD_REQUEST, cors, msg).into_response(),
            Err(e) => {
                warn!("Chat request failed: {}", e);
                (
                    status_of(&e),
                    cors,
                    format!("An error occurred while processing your request: {}", e),
                )
                    .into_response()
            }
        }
    }
    .instrument(span)
    .await
}

/// GET /api/httpTriggerDb, /api/httpTriggerDbConnection
async fn handle_db_keepalive(
    State(state): State<Arc<AppState>>,
    path: MatchedPath,
    headers: HeaderMap,
) -> Response {
    let route = path.as_str();
    let span = info_span!("invocation", id = %Uuid::new_v4(), route = %route);
    async move {
        info!("Http function processed request for url \"{}\"", route);
        let cors = state.cors.headers(&headers, &DATABASE_CORS);

        let outcome = match state.probe() {
            Ok(probe) => run_keepalive(probe.as_ref(), route).await.map_err(AppError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(_) => (StatusCode::OK, cors, "Database ready").into_response(),
            Err(e) => (
                status_of(&e),
                cors,
                format!("Error connecting to the database: {}", e),
            )
                .into_response(),
        }
    }
    .instrument(span)
    .await
}

async fn handle_method_not_allowed(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let cors = state.cors.headers(&headers, policy_for_path(uri.path()));
    (StatusCode::METHOD_NOT_ALLOWED, cors).into_response()
}

async fn handle_not_found(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let cors = state.cors.headers(&headers, policy_for_path(uri.path()));
    (StatusCode::NOT_FOUND, cors).into_response()
}

/// GET /health
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

fn status_of(e: &AppError) -> StatusCode {
    StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Start the HTTP server on the given address, stopping when `shutdown` resolves.
pub async fn serve<F>(addr: &str, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
