//! HTTP surface a chat adapter talks to, plus the adapters the binary wires
//! into the orchestrator (webhook alerts, remote graph rendering).

pub mod alerts;
pub mod config;
pub mod renderer;
pub mod types;

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use proxbot_orchestrator::{catalog, AutocompleteChoice, CommandSpec, Dispatcher, Reply};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::debug;
use uuid::Uuid;

use types::{AutocompleteQuery, HealthResponse, InteractionRequest, PromptAnswer};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Flips to `true` once the listener is bound and the monitor may start.
    pub ready: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, ready: watch::Receiver<bool>) -> Self {
        Self { dispatcher, ready }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn new(code: &str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new("INVALID_REQUEST", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::new("INVALID_PROMPT_ID", rejection.body_text())
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/commands", get(commands_handler))
        .route("/api/v1/interactions", post(interaction_handler))
        .route("/api/v1/prompts/:id", post(prompt_handler))
        .route("/api/v1/autocomplete", get(autocomplete_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn commands_handler() -> Json<Vec<CommandSpec>> {
    Json(catalog())
}

async fn interaction_handler(
    State(state): State<AppState>,
    payload: Result<Json<InteractionRequest>, JsonRejection>,
) -> Result<Json<Reply>, ApiError> {
    let Json(req) = payload?;
    debug!(command = req.command.name(), "Interaction received");
    Ok(Json(state.dispatcher.handle(&req.context, req.command).await))
}

async fn prompt_handler(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PromptAnswer>, JsonRejection>,
) -> Result<Json<Reply>, ApiError> {
    let Path(id) = id?;
    let Json(answer) = payload?;
    Ok(Json(
        state
            .dispatcher
            .resolve_prompt(&answer.context, id, answer.choice)
            .await,
    ))
}

async fn autocomplete_handler(
    State(state): State<AppState>,
    Query(query): Query<AutocompleteQuery>,
) -> Json<Vec<AutocompleteChoice>> {
    Json(state.dispatcher.autocomplete(&query.q).await)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        ready: *state.ready.borrow(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
