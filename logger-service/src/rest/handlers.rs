use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use crate::store::{FindQuery, LogRecord, LogStore, NewLogEntry, PersistenceError};

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn LogStore>,
}

/// API error response
#[derive(Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    pub code: u32,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.code {
            404 => StatusCode::NOT_FOUND,
            400 => StatusCode::BAD_REQUEST,
            503 => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::InvalidArgument(msg) => ApiError {
                error: msg,
                code: 400,
            },
            PersistenceError::NotFound(msg) => ApiError {
                error: msg,
                code: 404,
            },
            PersistenceError::Backend(msg) => ApiError {
                error: msg,
                code: 503, // Store unreachable or failing
            },
        }
    }
}

/// Version information
#[derive(Serialize, ToSchema)]
pub struct VersionInfo {
    pub version: String,
}

/// Get service version
#[utoipa::path(
    get,
    path = "/v1/version",
    responses(
        (status = 200, description = "Service version", body = VersionInfo)
    ),
    tag = "system"
)]
pub async fn get_version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Liveness heartbeat
#[utoipa::path(
    get,
    path = "/ping",
    responses(
        (status = 200, description = "Service is up", body = String)
    ),
    tag = "system"
)]
pub async fn heartbeat() -> &'static str {
    "."
}

/// Request to write a log entry
#[derive(Deserialize, ToSchema)]
pub struct WriteLogRequest {
    /// Producer-chosen category
    pub name: String,
    /// Free-form payload
    #[serde(default)]
    pub data: String,
}

/// Acknowledgement for a written log entry
#[derive(Serialize, ToSchema)]
pub struct WriteLogResponse {
    pub error: bool,
    pub message: String,
    pub id: String,
}

/// Write a log entry
#[utoipa::path(
    post,
    path = "/log",
    request_body = WriteLogRequest,
    responses(
        (status = 202, description = "Entry persisted", body = WriteLogResponse),
        (status = 400, description = "Invalid entry", body = ApiError),
        (status = 503, description = "Store unavailable", body = ApiError)
    ),
    tag = "logs"
)]
pub async fn write_log(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WriteLogRequest>,
) -> Result<(StatusCode, Json<WriteLogResponse>), ApiError> {
    let id = state
        .store
        .insert(NewLogEntry {
            name: req.name,
            data: req.data,
        })
        .await?;
    debug!(id = %id, "Log entry written via HTTP");

    Ok((
        StatusCode::ACCEPTED,
        Json(WriteLogResponse {
            error: false,
            message: "logged".to_string(),
            id,
        }),
    ))
}

/// A persisted log entry
#[derive(Serialize, ToSchema)]
pub struct LogEntryView {
    pub id: String,
    pub name: String,
    pub data: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<LogRecord> for LogEntryView {
    fn from(record: LogRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            data: record.data,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

/// Query parameters for listing logs
#[derive(Deserialize, ToSchema)]
pub struct ListLogsQuery {
    /// Maximum number of entries (default 100, max 1000)
    pub limit: Option<u32>,
}

/// Response wrapper for logs
#[derive(Serialize, ToSchema)]
pub struct LogsResponse {
    pub logs: Vec<LogEntryView>,
}

/// List the most recent log entries
#[utoipa::path(
    get,
    path = "/v1/logs",
    params(
        ("limit" = Option<u32>, Query, description = "Maximum number of entries (default 100, max 1000)")
    ),
    responses(
        (status = 200, description = "Most recent entries first", body = LogsResponse),
        (status = 503, description = "Store unavailable", body = ApiError)
    ),
    tag = "logs"
)]
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListLogsQuery>,
) -> Result<Json<LogsResponse>, ApiError> {
    let records = state.store.find(FindQuery { limit: query.limit }).await?;
    Ok(Json(LogsResponse {
        logs: records.into_iter().map(Into::into).collect(),
    }))
}

/// Get a log entry by ID
#[utoipa::path(
    get,
    path = "/v1/logs/{id}",
    params(
        ("id" = String, Path, description = "Log entry ID")
    ),
    responses(
        (status = 200, description = "Log entry", body = LogEntryView),
        (status = 400, description = "Malformed ID", body = ApiError),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "logs"
)]
pub async fn get_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LogEntryView>, ApiError> {
    state
        .store
        .get(&id)
        .await?
        .map(|record| Json(record.into()))
        .ok_or_else(|| ApiError {
            error: format!("Log entry {} not found", id),
            code: 404,
        })
}
