use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use coach_relay_core::tool::Registry;
use coach_relay_core::{
    ChatRequest, Conversation, Error, ModelClient, Orchestrator,
};
use coach_relay_openai_model::{OpenAIConfigBuilder, OpenAIProvider};
use futures_util::TryStreamExt;
use serde::Serialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Settings;

/// Creates a model client for each request.
///
/// Requests may carry their own credential, so clients are built per
/// request rather than once at startup.
pub trait ClientFactory: Send + Sync + 'static {
    /// Creates a client authenticating with `api_key`.
    fn create_client(&self, api_key: &str) -> ModelClient;
}

impl<F> ClientFactory for F
where
    F: Fn(&str) -> ModelClient + Send + Sync + 'static,
{
    #[inline]
    fn create_client(&self, api_key: &str) -> ModelClient {
        self(api_key)
    }
}

/// Creates clients talking to an OpenAI-compatible provider.
///
/// All clients share one connection pool.
pub struct OpenAIClientFactory {
    http: reqwest::Client,
    settings: Arc<Settings>,
}

impl OpenAIClientFactory {
    /// Creates a factory using the provider settings of `settings`.
    #[inline]
    pub fn new(http: reqwest::Client, settings: Arc<Settings>) -> Self {
        Self { http, settings }
    }
}

impl ClientFactory for OpenAIClientFactory {
    fn create_client(&self, api_key: &str) -> ModelClient {
        let config = OpenAIConfigBuilder::with_api_key(api_key)
            .with_base_url(&self.settings.base_url)
            .with_model(&self.settings.model)
            .with_timeout(self.settings.request_timeout())
            .build();
        ModelClient::new(OpenAIProvider::with_client(self.http.clone(), config))
    }
}

/// Application state shared across requests.
#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    clients: Arc<dyn ClientFactory>,
    tools: Arc<Registry>,
}

impl AppState {
    /// Creates the state. An empty registry disables the tool path.
    #[inline]
    pub fn new<F: ClientFactory>(
        settings: Arc<Settings>,
        clients: F,
        tools: Registry,
    ) -> Self {
        Self {
            settings,
            clients: Arc::new(clients),
            tools: Arc::new(tools),
        }
    }
}

/// Creates the router with all routes.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct ChatReply {
    reply: String,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    info!(
        "chat request: single message: {}, streaming: {}",
        req.message.as_deref().is_some_and(|m| !m.is_empty()),
        req.stream
    );
    trace!("chat request: {req:?}");

    let api_key = resolve_api_key(&req, &state.settings)?;
    let client = state.clients.create_client(api_key);

    let conversation =
        Conversation::from_request(&req, &state.settings.instructions);
    let model = req
        .model
        .as_deref()
        .filter(|model| !model.is_empty())
        .unwrap_or(&state.settings.model);
    let orchestrator = Orchestrator::new(&client, &state.tools, model);

    if req.stream {
        let chunks = orchestrator.stream(&conversation).await?;
        // Headers are out at this point, the body just ends early.
        let chunks = chunks.inspect_err(|err| {
            error!("streaming reply broke: {err}");
        });
        let headers = [(CONTENT_TYPE, "text/plain; charset=utf-8")];
        return Ok((headers, Body::from_stream(chunks)).into_response());
    }

    let reply = orchestrator.reply(conversation).await?;
    Ok(Json(ChatReply { reply }).into_response())
}

fn resolve_api_key<'a>(
    req: &'a ChatRequest,
    settings: &'a Settings,
) -> Result<&'a str, Error> {
    req.api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .or_else(|| settings.api_key())
        .ok_or_else(|| Error::configuration("OPENAI_API_KEY not configured"))
}

struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("chat request failed ({}): {}", self.0.kind(), self.0);
        let body = Json(json!({ "detail": self.0.message() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
