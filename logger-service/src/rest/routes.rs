use axum::{
    Json, Router,
    http::Method,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::handlers::{self, AppState};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "logger-service",
        version = "0.1.0",
        description = "HTTP API of the log ingestion gateway. Entries written here share storage with the RPC transport.",
        license(name = "MIT")
    ),
    tags(
        (name = "system", description = "System information"),
        (name = "logs", description = "Log ingestion and retrieval")
    ),
    paths(
        handlers::get_version,
        handlers::heartbeat,
        handlers::write_log,
        handlers::list_logs,
        handlers::get_log,
    ),
    components(schemas(
        handlers::VersionInfo,
        handlers::WriteLogRequest,
        handlers::WriteLogResponse,
        handlers::LogEntryView,
        handlers::ListLogsQuery,
        handlers::LogsResponse,
        handlers::ApiError,
    ))
)]
pub struct ApiDoc;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let v1_routes = Router::new()
        .route("/version", get(handlers::get_version))
        .route("/logs", get(handlers::list_logs))
        .route("/logs/{id}", get(handlers::get_log));

    Router::new()
        .route("/ping", get(handlers::heartbeat))
        .route("/log", post(handlers::write_log))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .nest("/v1", v1_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
