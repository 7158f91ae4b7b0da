//! HTTP handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use super::models::{ChatRequest, ChatResponse, ErrorResponse, HealthResponse, ReloadResponse};
use super::SharedState;
use crate::capabilities::prompts;
use crate::orchestrator::TurnError;
use crate::schema_catalog::SchemaCatalog;
use crate::session::SessionError;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

/// POST /chat: run one conversation turn.
pub async fn chat(
    State(state): State<SharedState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let question = request.query.trim().to_string();
    if question.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "query must not be empty"));
    }
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (guard, history) = state.sessions.begin_turn(&session_id).map_err(|e| match e {
        SessionError::Busy { session_id } => api_error(
            StatusCode::CONFLICT,
            format!(
                "session '{}' is still processing a previous message",
                session_id
            ),
        ),
    })?;

    // Pin the catalog for the whole turn; a concurrent reload swaps the
    // shared pointer without touching this snapshot.
    let catalog = state.catalog_snapshot();

    let outcome = state
        .orchestrator
        .run_turn(&catalog, &question, &history, &guard)
        .await
        .map_err(turn_error_response)?;

    state
        .sessions
        .record_exchange(&session_id, &guard, question, outcome.answer.clone());

    Ok(Json(ChatResponse {
        session_id,
        response: outcome.answer,
        sql: outcome.sql,
        tables: outcome.tables,
        attempts: outcome.attempts,
    }))
}

fn turn_error_response(error: TurnError) -> ApiError {
    let status = match &error {
        TurnError::Cancelled => StatusCode::CONFLICT,
        TurnError::NoJoinPath { .. } | TurnError::RetryExhausted { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TurnError::Upstream(_) => StatusCode::BAD_GATEWAY,
        TurnError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        log::error!("Turn failed: {}", error);
    } else {
        log::warn!("Turn rejected: {}", error);
    }
    // Users get a readable message, never an internal error dump.
    let detail = match &error {
        TurnError::RetryExhausted { .. } => prompts::retry_exhausted_message(),
        other => other.to_string(),
    };
    api_error(status, detail)
}

/// GET /health: liveness plus a database ping. Always 200; the body says
/// whether the database is reachable.
pub async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let database_up = state.executor.ping().await.is_ok();
    let catalog = state.catalog_snapshot();
    Json(HealthResponse {
        status: if database_up { "healthy" } else { "degraded" },
        database: if database_up { "up" } else { "down" },
        tables: catalog.graph.table_count(),
        active_sessions: state.sessions.active_count(),
    })
}

/// GET /schema: the current metadata snapshot.
pub async fn schema(State(state): State<SharedState>) -> impl IntoResponse {
    let catalog = state.catalog_snapshot();
    Json(catalog.metadata.clone())
}

/// POST /schema/reload: rediscover metadata, rebuild the catalog, and swap
/// it in atomically. On failure the previous catalog stays active.
pub async fn reload_schema(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, ApiError> {
    let metadata = state
        .provider
        .fetch()
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e.to_string()))?;

    let catalog = SchemaCatalog::build(metadata, &state.overlay, state.embedder.as_ref())
        .await
        .map_err(|e| {
            log::error!("Schema reload failed, keeping previous catalog: {}", e);
            api_error(StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    let response = ReloadResponse {
        tables: catalog.graph.table_count(),
        join_edges: catalog.graph.edge_count(),
    };
    *state.catalog.write().unwrap_or_else(|e| e.into_inner()) = std::sync::Arc::new(catalog);
    log::info!(
        "Schema catalog reloaded: {} tables, {} join edges",
        response.tables,
        response.join_edges
    );
    Ok(Json(response))
}

/// DELETE /session/{session_id}: drop history and cancel any in-flight turn.
pub async fn clear_session(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if state.sessions.clear(&session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(
            StatusCode::NOT_FOUND,
            format!("no session '{}'", session_id),
        ))
    }
}
