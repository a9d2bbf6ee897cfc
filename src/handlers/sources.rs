//! # Source API Handlers
//!
//! CRUD for polled sources plus the manual sync trigger. Source responses
//! never include token material or the auth payload; clients can see that
//! credentials exist, never what they are.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::ingest::auth::{AUTH_MODE_BEARER, AUTH_MODE_NONE};
use crate::models::source;
use crate::repositories::SourceRepository;
use crate::server::AppState;

/// Source representation returned to clients.
///
/// Tokens and the auth payload are deliberately absent; only their presence
/// is reported.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SourceDto {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
    /// `none` or `bearer`
    pub auth_mode: String,
    pub auth_endpoint: Option<String>,
    /// Whether a bearer access token is currently stored
    pub has_access_token: bool,
    /// Whether a refresh token is currently stored
    pub has_refresh_token: bool,
    pub poll_interval_seconds: i64,
    pub active: bool,
    pub last_synced_at: Option<String>,
    pub last_success_at: Option<String>,
    pub last_error: Option<String>,
    pub next_sync_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<source::Model> for SourceDto {
    fn from(model: source::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            base_url: model.base_url,
            auth_mode: model.auth_mode,
            auth_endpoint: model.auth_endpoint,
            has_access_token: model.access_token.is_some_and(|t| !t.is_empty()),
            has_refresh_token: model.refresh_token.is_some_and(|t| !t.is_empty()),
            poll_interval_seconds: model.poll_interval_seconds,
            active: model.active,
            last_synced_at: model.last_synced_at.map(|t| t.to_rfc3339()),
            last_success_at: model.last_success_at.map(|t| t.to_rfc3339()),
            last_error: model.last_error,
            next_sync_at: model.next_sync_at.map(|t| t.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Request payload for creating a source
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateSourceRequest {
    /// Operator-facing display name (required, max 255 characters)
    #[schema(example = "Warehouse inventory API")]
    pub name: String,
    /// Base URL endpoint paths are resolved against
    #[schema(example = "https://inventory.example.com/api/")]
    pub base_url: String,
    /// Authentication mode: `none` (default) or `bearer`
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,
    /// Token endpoint; required when auth_mode is `bearer`
    pub auth_endpoint: Option<String>,
    /// JSON payload posted to the auth endpoint on refresh (write-only)
    pub auth_payload: Option<serde_json::Value>,
    /// Initial bearer access token (write-only)
    pub access_token: Option<String>,
    /// Initial refresh token (write-only)
    pub refresh_token: Option<String>,
    /// Poll interval in seconds; 0 means the service default
    #[serde(default)]
    pub poll_interval_seconds: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Request payload for updating a source; absent fields are left untouched
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateSourceRequest {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub auth_mode: Option<String>,
    pub auth_endpoint: Option<String>,
    pub auth_payload: Option<serde_json::Value>,
    /// Replacement access token (write-only)
    pub access_token: Option<String>,
    /// Replacement refresh token (write-only)
    pub refresh_token: Option<String>,
    pub poll_interval_seconds: Option<i64>,
    pub active: Option<bool>,
}

/// Acknowledgement for an accepted manual sync trigger
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncAcceptedDto {
    pub source_id: Uuid,
    /// Always `accepted`; the pass runs asynchronously
    pub status: String,
}

fn default_auth_mode() -> String {
    AUTH_MODE_NONE.to_string()
}

fn default_active() -> bool {
    true
}

fn validate_auth_config(
    auth_mode: &str,
    auth_endpoint: Option<&str>,
) -> Result<(), ApiError> {
    match auth_mode {
        AUTH_MODE_NONE => Ok(()),
        AUTH_MODE_BEARER => {
            let endpoint = auth_endpoint
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    ApiError::validation("auth_endpoint is required when auth_mode is 'bearer'")
                })?;
            Url::parse(endpoint)
                .map_err(|e| ApiError::validation(format!("invalid auth_endpoint: {}", e)))?;
            Ok(())
        }
        other => Err(ApiError::validation(format!(
            "auth_mode must be 'none' or 'bearer', got '{}'",
            other
        ))),
    }
}

fn validate_base_url(base_url: &str) -> Result<(), ApiError> {
    Url::parse(base_url).map_err(|e| ApiError::validation(format!("invalid base_url: {}", e)))?;
    Ok(())
}

/// List all sources
#[utoipa::path(
    get,
    path = "/api/v1/sources",
    responses(
        (status = 200, description = "Sources listed", body = Vec<SourceDto>),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "sources"
)]
pub async fn list_sources(State(state): State<AppState>) -> Result<Json<Vec<SourceDto>>, ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    let sources = repo.list_all().await?;
    Ok(Json(sources.into_iter().map(SourceDto::from).collect()))
}

/// Get a source by ID
#[utoipa::path(
    get,
    path = "/api/v1/sources/{id}",
    params(("id" = Uuid, Path, description = "Source UUID")),
    responses(
        (status = 200, description = "Source retrieved", body = SourceDto),
        (status = 404, description = "Source not found", body = ApiError)
    ),
    tag = "sources"
)]
pub async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SourceDto>, ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    let source = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Source not found"))?;
    Ok(Json(source.into()))
}

/// Create a source
#[utoipa::path(
    post,
    path = "/api/v1/sources",
    request_body = CreateSourceRequest,
    responses(
        (status = 201, description = "Source created", body = SourceDto, headers(
            ("Location", description = "URL of the created source")
        )),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 409, description = "Source already exists", body = ApiError)
    ),
    tag = "sources"
)]
pub async fn create_source(
    State(state): State<AppState>,
    Json(request): Json<CreateSourceRequest>,
) -> Result<(StatusCode, [(&'static str, String); 1], Json<SourceDto>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    if request.name.len() > 255 {
        return Err(ApiError::validation("name cannot exceed 255 characters"));
    }
    validate_base_url(&request.base_url)?;
    validate_auth_config(&request.auth_mode, request.auth_endpoint.as_deref())?;
    if request.poll_interval_seconds < 0 {
        return Err(ApiError::validation("poll_interval_seconds cannot be negative"));
    }

    let now = Utc::now();
    let model = source::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(request.name.trim().to_string()),
        base_url: Set(request.base_url),
        auth_mode: Set(request.auth_mode),
        auth_endpoint: Set(request.auth_endpoint),
        auth_payload: Set(request.auth_payload),
        access_token: Set(request.access_token),
        refresh_token: Set(request.refresh_token),
        poll_interval_seconds: Set(request.poll_interval_seconds),
        active: Set(request.active),
        last_synced_at: Set(None),
        last_success_at: Set(None),
        last_error: Set(None),
        next_sync_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    let repo = SourceRepository::new(state.db.clone());
    let created = repo.create(model).await?;
    let location = format!("/api/v1/sources/{}", created.id);

    Ok((StatusCode::CREATED, [("Location", location)], Json(created.into())))
}

/// Update a source
#[utoipa::path(
    patch,
    path = "/api/v1/sources/{id}",
    params(("id" = Uuid, Path, description = "Source UUID")),
    request_body = UpdateSourceRequest,
    responses(
        (status = 200, description = "Source updated", body = SourceDto),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Source not found", body = ApiError)
    ),
    tag = "sources"
)]
pub async fn update_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateSourceRequest>,
) -> Result<Json<SourceDto>, ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    let existing = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Source not found"))?;

    let auth_mode = request.auth_mode.as_deref().unwrap_or(&existing.auth_mode);
    let auth_endpoint = request
        .auth_endpoint
        .as_deref()
        .or(existing.auth_endpoint.as_deref());
    validate_auth_config(auth_mode, auth_endpoint)?;
    if let Some(base_url) = &request.base_url {
        validate_base_url(base_url)?;
    }
    if let Some(name) = &request.name {
        if name.trim().is_empty() {
            return Err(ApiError::validation("name cannot be empty"));
        }
        if name.len() > 255 {
            return Err(ApiError::validation("name cannot exceed 255 characters"));
        }
    }
    if let Some(interval) = request.poll_interval_seconds
        && interval < 0
    {
        return Err(ApiError::validation("poll_interval_seconds cannot be negative"));
    }

    let mut model = source::ActiveModel {
        id: Set(id),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
    };
    if let Some(name) = request.name {
        model.name = Set(name.trim().to_string());
    }
    if let Some(base_url) = request.base_url {
        model.base_url = Set(base_url);
    }
    if let Some(auth_mode) = request.auth_mode {
        model.auth_mode = Set(auth_mode);
    }
    if request.auth_endpoint.is_some() {
        model.auth_endpoint = Set(request.auth_endpoint);
    }
    if request.auth_payload.is_some() {
        model.auth_payload = Set(request.auth_payload);
    }
    if request.access_token.is_some() {
        model.access_token = Set(request.access_token);
    }
    if request.refresh_token.is_some() {
        model.refresh_token = Set(request.refresh_token);
    }
    if let Some(interval) = request.poll_interval_seconds {
        model.poll_interval_seconds = Set(interval);
    }
    if let Some(active) = request.active {
        model.active = Set(active);
    }

    let updated = repo.update(model).await?;
    Ok(Json(updated.into()))
}

/// Delete a source and everything under it
#[utoipa::path(
    delete,
    path = "/api/v1/sources/{id}",
    params(("id" = Uuid, Path, description = "Source UUID")),
    responses(
        (status = 204, description = "Source deleted"),
        (status = 404, description = "Source not found", body = ApiError)
    ),
    tag = "sources"
)]
pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    let deleted = repo.delete(id).await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Source not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Trigger a sync pass immediately
///
/// The pass runs asynchronously; if one is already in flight for the source
/// the trigger is coalesced into it.
#[utoipa::path(
    post,
    path = "/api/v1/sources/{id}/sync",
    params(("id" = Uuid, Path, description = "Source UUID")),
    responses(
        (status = 202, description = "Sync pass accepted", body = SyncAcceptedDto),
        (status = 404, description = "Source not found", body = ApiError),
        (status = 409, description = "Source is inactive", body = ApiError),
        (status = 503, description = "Trigger queue full", body = ApiError)
    ),
    tag = "sources"
)]
pub async fn sync_now(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SyncAcceptedDto>), ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    let source = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Source not found"))?;

    if !source.active {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "SOURCE_INACTIVE",
            "Source is inactive and cannot be synced",
        ));
    }

    state.sync_tx.try_send(id).map_err(|err| match err {
        tokio::sync::mpsc::error::TrySendError::Full(_) => {
            let mut api_err = ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SYNC_QUEUE_FULL",
                "Too many pending sync triggers, retry shortly",
            );
            api_err.retry_after = Some(5);
            api_err
        }
        tokio::sync::mpsc::error::TrySendError::Closed(_) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Sync trigger channel is closed",
        ),
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncAcceptedDto {
            source_id: id,
            status: "accepted".to_string(),
        }),
    ))
}
