//! # Endpoint and Mapping API Handlers
//!
//! Nested CRUD under a source: endpoints, their mapping sets, and the
//! preview operation that fetches an endpoint once and mirrors the upstream
//! response verbatim.

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, IngestError};
use crate::ingest::orchestrator::{ALLOWED_METHODS, SHAPE_AUTO, SHAPE_LIST, SHAPE_SINGLE};
use crate::ingest::resolver::TargetKind;
use crate::models::{endpoint, mapping};
use crate::repositories::SourceRepository;
use crate::server::AppState;

/// Endpoint representation returned to clients
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EndpointDto {
    pub id: Uuid,
    pub source_id: Uuid,
    pub path: String,
    pub method: String,
    pub body_template: Option<JsonValue>,
    /// `single`, `list`, or `auto`
    pub response_shape: String,
    pub active: bool,
    pub last_synced_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<endpoint::Model> for EndpointDto {
    fn from(model: endpoint::Model) -> Self {
        Self {
            id: model.id,
            source_id: model.source_id,
            path: model.path,
            method: model.method,
            body_template: model.body_template,
            response_shape: model.response_shape,
            active: model.active,
            last_synced_at: model.last_synced_at.map(|t| t.to_rfc3339()),
            last_error: model.last_error,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Request payload for creating an endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateEndpointRequest {
    /// Path relative to the source base URL
    #[schema(example = "v2/assets")]
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Literal request body; `null` (the default) sends no body
    pub body_template: Option<JsonValue>,
    #[serde(default = "default_shape")]
    pub response_shape: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Request payload for updating an endpoint; absent fields are left untouched
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateEndpointRequest {
    pub path: Option<String>,
    pub method: Option<String>,
    pub body_template: Option<JsonValue>,
    pub response_shape: Option<String>,
    pub active: Option<bool>,
}

/// Mapping representation returned to clients
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MappingDto {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub path_expr: String,
    pub target_kind: String,
    pub target_field: String,
    pub is_identity: bool,
    pub created_at: String,
}

impl From<mapping::Model> for MappingDto {
    fn from(model: mapping::Model) -> Self {
        Self {
            id: model.id,
            endpoint_id: model.endpoint_id,
            path_expr: model.path_expr,
            target_kind: model.target_kind,
            target_field: model.target_field,
            is_identity: model.is_identity,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// One mapping in a replacement set
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MappingItemRequest {
    /// Dot path evaluated against each item, e.g. `device.info.serial`
    pub path_expr: String,
    /// Target entity kind: `equipment_type`, `asset`, `organization`, `person`, or `place`
    pub target_kind: String,
    /// Target field on the entity; may be empty for pure identity mappings
    #[serde(default)]
    pub target_field: String,
    /// Whether this mapping supplies the item's natural key
    #[serde(default)]
    pub is_identity: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_shape() -> String {
    SHAPE_AUTO.to_string()
}

fn default_active() -> bool {
    true
}

fn validate_method(method: &str) -> Result<(), ApiError> {
    if ALLOWED_METHODS.contains(&method) {
        Ok(())
    } else {
        Err(ApiError::validation(format!(
            "method must be one of {}, got '{}'",
            ALLOWED_METHODS.join(", "),
            method
        )))
    }
}

fn validate_shape(shape: &str) -> Result<(), ApiError> {
    match shape {
        SHAPE_SINGLE | SHAPE_LIST | SHAPE_AUTO => Ok(()),
        other => Err(ApiError::validation(format!(
            "response_shape must be 'single', 'list', or 'auto', got '{}'",
            other
        ))),
    }
}

/// Fetch an endpoint verifying it belongs to the source in the URL.
async fn endpoint_under_source(
    repo: &SourceRepository,
    source_id: Uuid,
    endpoint_id: Uuid,
) -> Result<endpoint::Model, ApiError> {
    let endpoint = repo
        .get_endpoint(endpoint_id)
        .await?
        .filter(|e| e.source_id == source_id)
        .ok_or_else(|| ApiError::not_found("Endpoint not found"))?;
    Ok(endpoint)
}

/// List endpoints under a source
#[utoipa::path(
    get,
    path = "/api/v1/sources/{source_id}/endpoints",
    params(("source_id" = Uuid, Path, description = "Source UUID")),
    responses(
        (status = 200, description = "Endpoints listed", body = Vec<EndpointDto>),
        (status = 404, description = "Source not found", body = ApiError)
    ),
    tag = "endpoints"
)]
pub async fn list_endpoints(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
) -> Result<Json<Vec<EndpointDto>>, ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    repo.get(source_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Source not found"))?;

    let endpoints = repo.endpoints_for_source(source_id).await?;
    Ok(Json(endpoints.into_iter().map(EndpointDto::from).collect()))
}

/// Create an endpoint under a source
#[utoipa::path(
    post,
    path = "/api/v1/sources/{source_id}/endpoints",
    params(("source_id" = Uuid, Path, description = "Source UUID")),
    request_body = CreateEndpointRequest,
    responses(
        (status = 201, description = "Endpoint created", body = EndpointDto),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Source not found", body = ApiError)
    ),
    tag = "endpoints"
)]
pub async fn create_endpoint(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
    Json(request): Json<CreateEndpointRequest>,
) -> Result<(StatusCode, Json<EndpointDto>), ApiError> {
    if request.path.trim().is_empty() {
        return Err(ApiError::validation("path is required"));
    }
    validate_method(&request.method)?;
    validate_shape(&request.response_shape)?;

    let repo = SourceRepository::new(state.db.clone());
    repo.get(source_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Source not found"))?;

    let now = Utc::now();
    let model = endpoint::ActiveModel {
        id: Set(Uuid::new_v4()),
        source_id: Set(source_id),
        path: Set(request.path.trim().to_string()),
        method: Set(request.method),
        body_template: Set(request.body_template),
        response_shape: Set(request.response_shape),
        active: Set(request.active),
        last_synced_at: Set(None),
        last_error: Set(None),
        last_etag: Set(None),
        last_content_hash: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };

    let created = repo.create_endpoint(model).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Get an endpoint
#[utoipa::path(
    get,
    path = "/api/v1/sources/{source_id}/endpoints/{endpoint_id}",
    params(
        ("source_id" = Uuid, Path, description = "Source UUID"),
        ("endpoint_id" = Uuid, Path, description = "Endpoint UUID")
    ),
    responses(
        (status = 200, description = "Endpoint retrieved", body = EndpointDto),
        (status = 404, description = "Endpoint not found", body = ApiError)
    ),
    tag = "endpoints"
)]
pub async fn get_endpoint(
    State(state): State<AppState>,
    Path((source_id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<EndpointDto>, ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    let endpoint = endpoint_under_source(&repo, source_id, endpoint_id).await?;
    Ok(Json(endpoint.into()))
}

/// Update an endpoint
#[utoipa::path(
    patch,
    path = "/api/v1/sources/{source_id}/endpoints/{endpoint_id}",
    params(
        ("source_id" = Uuid, Path, description = "Source UUID"),
        ("endpoint_id" = Uuid, Path, description = "Endpoint UUID")
    ),
    request_body = UpdateEndpointRequest,
    responses(
        (status = 200, description = "Endpoint updated", body = EndpointDto),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Endpoint not found", body = ApiError)
    ),
    tag = "endpoints"
)]
pub async fn update_endpoint(
    State(state): State<AppState>,
    Path((source_id, endpoint_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateEndpointRequest>,
) -> Result<Json<EndpointDto>, ApiError> {
    if let Some(method) = &request.method {
        validate_method(method)?;
    }
    if let Some(shape) = &request.response_shape {
        validate_shape(shape)?;
    }
    if let Some(path) = &request.path
        && path.trim().is_empty()
    {
        return Err(ApiError::validation("path cannot be empty"));
    }

    let repo = SourceRepository::new(state.db.clone());
    endpoint_under_source(&repo, source_id, endpoint_id).await?;

    let mut model = endpoint::ActiveModel {
        id: Set(endpoint_id),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
    };
    if let Some(path) = request.path {
        model.path = Set(path.trim().to_string());
    }
    if let Some(method) = request.method {
        model.method = Set(method);
    }
    if request.body_template.is_some() {
        model.body_template = Set(request.body_template);
    }
    if let Some(shape) = request.response_shape {
        model.response_shape = Set(shape);
    }
    if let Some(active) = request.active {
        model.active = Set(active);
    }

    let updated = repo.update_endpoint(model).await?;
    Ok(Json(updated.into()))
}

/// Delete an endpoint and its mappings
#[utoipa::path(
    delete,
    path = "/api/v1/sources/{source_id}/endpoints/{endpoint_id}",
    params(
        ("source_id" = Uuid, Path, description = "Source UUID"),
        ("endpoint_id" = Uuid, Path, description = "Endpoint UUID")
    ),
    responses(
        (status = 204, description = "Endpoint deleted"),
        (status = 404, description = "Endpoint not found", body = ApiError)
    ),
    tag = "endpoints"
)]
pub async fn delete_endpoint(
    State(state): State<AppState>,
    Path((source_id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    endpoint_under_source(&repo, source_id, endpoint_id).await?;
    repo.delete_endpoint(endpoint_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List an endpoint's mappings in evaluation order
#[utoipa::path(
    get,
    path = "/api/v1/sources/{source_id}/endpoints/{endpoint_id}/mappings",
    params(
        ("source_id" = Uuid, Path, description = "Source UUID"),
        ("endpoint_id" = Uuid, Path, description = "Endpoint UUID")
    ),
    responses(
        (status = 200, description = "Mappings listed", body = Vec<MappingDto>),
        (status = 404, description = "Endpoint not found", body = ApiError)
    ),
    tag = "mappings"
)]
pub async fn list_mappings(
    State(state): State<AppState>,
    Path((source_id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<MappingDto>>, ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    endpoint_under_source(&repo, source_id, endpoint_id).await?;

    let mappings = repo.mappings_for_endpoint(endpoint_id).await?;
    Ok(Json(mappings.into_iter().map(MappingDto::from).collect()))
}

/// Replace an endpoint's full mapping set
///
/// Mappings are evaluated in the order given; when several identity
/// mappings exist the first that resolves wins.
#[utoipa::path(
    put,
    path = "/api/v1/sources/{source_id}/endpoints/{endpoint_id}/mappings",
    params(
        ("source_id" = Uuid, Path, description = "Source UUID"),
        ("endpoint_id" = Uuid, Path, description = "Endpoint UUID")
    ),
    request_body = Vec<MappingItemRequest>,
    responses(
        (status = 200, description = "Mappings replaced", body = Vec<MappingDto>),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 404, description = "Endpoint not found", body = ApiError)
    ),
    tag = "mappings"
)]
pub async fn replace_mappings(
    State(state): State<AppState>,
    Path((source_id, endpoint_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<Vec<MappingItemRequest>>,
) -> Result<Json<Vec<MappingDto>>, ApiError> {
    for (index, item) in request.iter().enumerate() {
        if item.path_expr.trim().is_empty() {
            return Err(ApiError::validation(format!(
                "mapping {}: path_expr is required",
                index
            )));
        }
        if TargetKind::parse(&item.target_kind).is_none() {
            return Err(ApiError::validation(format!(
                "mapping {}: unknown target_kind '{}'",
                index, item.target_kind
            )));
        }
    }
    if !request.is_empty() && !request.iter().any(|m| m.is_identity) {
        return Err(ApiError::validation(
            "at least one identity mapping is required",
        ));
    }

    let repo = SourceRepository::new(state.db.clone());
    endpoint_under_source(&repo, source_id, endpoint_id).await?;

    // Stagger created_at so evaluation order survives the round-trip
    let base = Utc::now();
    let models = request
        .into_iter()
        .enumerate()
        .map(|(index, item)| mapping::ActiveModel {
            id: Set(Uuid::new_v4()),
            endpoint_id: Set(endpoint_id),
            path_expr: Set(item.path_expr.trim().to_string()),
            target_kind: Set(item.target_kind),
            target_field: Set(item.target_field.trim().to_string()),
            is_identity: Set(item.is_identity),
            created_at: Set((base + chrono::Duration::milliseconds(index as i64)).into()),
        })
        .collect();

    let replaced = repo.replace_mappings(endpoint_id, models).await?;
    Ok(Json(replaced.into_iter().map(MappingDto::from).collect()))
}

/// Fetch an endpoint once and mirror the upstream response
///
/// The upstream's status, content type, and body come back verbatim,
/// including authentication rejections that survive the token refresh.
/// Nothing is parsed, mapped, or persisted.
#[utoipa::path(
    post,
    path = "/api/v1/sources/{source_id}/endpoints/{endpoint_id}/preview",
    params(
        ("source_id" = Uuid, Path, description = "Source UUID"),
        ("endpoint_id" = Uuid, Path, description = "Endpoint UUID")
    ),
    responses(
        (status = 200, description = "Upstream response mirrored verbatim"),
        (status = 400, description = "Source misconfigured", body = ApiError),
        (status = 404, description = "Endpoint not found", body = ApiError),
        (status = 502, description = "Upstream unreachable", body = ApiError)
    ),
    tag = "endpoints"
)]
pub async fn preview_endpoint(
    State(state): State<AppState>,
    Path((source_id, endpoint_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let repo = SourceRepository::new(state.db.clone());
    let source = repo
        .get(source_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Source not found"))?;
    let endpoint = endpoint_under_source(&repo, source_id, endpoint_id).await?;

    match state.orchestrator.fetch_endpoint(source, &endpoint).await {
        Ok(response) => Ok(mirror(response.status, response.content_type, response.body)),
        Err(IngestError::AuthRejected {
            status,
            content_type,
            body,
        }) => Ok(mirror(status, content_type, body)),
        Err(IngestError::Configuration(message)) => Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "SOURCE_MISCONFIGURED".to_string(),
            message,
        )),
        Err(IngestError::Transport(message)) => Err(ApiError::new(
            StatusCode::BAD_GATEWAY,
            "UPSTREAM_UNREACHABLE".to_string(),
            message,
        )),
        Err(IngestError::Db(err)) => Err(err.into()),
        Err(other) => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR".to_string(),
            other.to_string(),
        )),
    }
}

fn mirror(status: u16, content_type: Option<String>, body: Vec<u8>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}
