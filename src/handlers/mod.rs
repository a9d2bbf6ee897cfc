//! # API Handlers
//!
//! HTTP endpoint handlers for the Ingestors admin API: source, endpoint,
//! and mapping management plus sync triggering and endpoint preview.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod endpoints;
pub mod sources;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Liveness/readiness probe backed by a database round-trip
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service healthy"),
        (status = 503, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|e| {
        tracing::warn!(error = %e, "Health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "Database unreachable",
        )
    })?;

    Ok(Json(serde_json::json!({ "status": "ok" })))
}
