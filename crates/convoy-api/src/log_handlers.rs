//! REST API handlers for the global log collection.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use convoy_services::{LogFilter, NewLogEntry};

use crate::ApiState;
use crate::response::{ApiResponse, created, reply, service_error};

/// GET /api/v1/logs
pub async fn list_logs(State(state): State<ApiState>, Query(filter): Query<LogFilter>) -> Response {
    reply(state.services.logs.list(&filter))
}

/// POST /api/v1/logs
pub async fn create_log(State(state): State<ApiState>, Json(input): Json<NewLogEntry>) -> Response {
    created(state.services.logs.create(input))
}

/// POST /api/v1/logs/batch
pub async fn ingest_logs(
    State(state): State<ApiState>,
    Json(batch): Json<Vec<NewLogEntry>>,
) -> Response {
    created(state.services.logs.ingest(batch))
}

/// DELETE /api/v1/logs
pub async fn clear_logs(State(state): State<ApiState>, Query(filter): Query<LogFilter>) -> Response {
    match state.services.logs.clear(&filter) {
        Ok(removed) => ApiResponse::ok(serde_json::json!({ "removed": removed })).into_response(),
        Err(e) => service_error(e),
    }
}

/// GET /api/v1/logs/stats
pub async fn log_stats(State(state): State<ApiState>) -> Response {
    reply(state.services.logs.stats())
}

/// GET /api/v1/logs/{id}
pub async fn get_log(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.logs.get(&id))
}

/// DELETE /api/v1/logs/{id}
pub async fn delete_log(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    reply(state.services.logs.delete(&id).map(|()| "deleted"))
}
