//! # Server Configuration
//!
//! Axum application assembly for the Ingestors admin API: shared state,
//! routing, OpenAPI documentation, and the serve loop with graceful
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::handlers;
use crate::ingest::SyncOrchestrator;
use crate::telemetry::{self, TraceContext};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    /// Manual sync triggers consumed by the poller
    pub sync_tx: mpsc::Sender<Uuid>,
    /// Shared with the poller; the preview handler fetches through it
    pub orchestrator: SyncOrchestrator,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        sync_tx: mpsc::Sender<Uuid>,
        orchestrator: SyncOrchestrator,
    ) -> Self {
        Self {
            db,
            sync_tx,
            orchestrator,
        }
    }
}

/// Build the outbound HTTP client shared by the poller and the preview
/// handler. The per-request timeout bounds every upstream call.
pub fn build_http_client(config: &AppConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.poller.request_timeout_seconds))
        .user_agent(concat!("ingestors/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/api/v1/sources",
            get(handlers::sources::list_sources).post(handlers::sources::create_source),
        )
        .route(
            "/api/v1/sources/{id}",
            get(handlers::sources::get_source)
                .patch(handlers::sources::update_source)
                .delete(handlers::sources::delete_source),
        )
        .route("/api/v1/sources/{id}/sync", post(handlers::sources::sync_now))
        .route(
            "/api/v1/sources/{source_id}/endpoints",
            get(handlers::endpoints::list_endpoints).post(handlers::endpoints::create_endpoint),
        )
        .route(
            "/api/v1/sources/{source_id}/endpoints/{endpoint_id}",
            get(handlers::endpoints::get_endpoint)
                .patch(handlers::endpoints::update_endpoint)
                .delete(handlers::endpoints::delete_endpoint),
        )
        .route(
            "/api/v1/sources/{source_id}/endpoints/{endpoint_id}/mappings",
            put(handlers::endpoints::replace_mappings).get(handlers::endpoints::list_mappings),
        )
        .route(
            "/api/v1/sources/{source_id}/endpoints/{endpoint_id}/preview",
            post(handlers::endpoints::preview_endpoint),
        )
        .layer(middleware::from_fn(trace_context))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Scope a trace id over each request so errors and logs correlate.
///
/// An incoming `x-request-id` header is honored; otherwise one is minted.
async fn trace_context(request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    telemetry::with_trace_context(TraceContext { trace_id }, next.run(request)).await
}

/// Starts the server, shutting down gracefully when the token fires
pub async fn run_server(
    config: AppConfig,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::sources::list_sources,
        crate::handlers::sources::get_source,
        crate::handlers::sources::create_source,
        crate::handlers::sources::update_source,
        crate::handlers::sources::delete_source,
        crate::handlers::sources::sync_now,
        crate::handlers::endpoints::list_endpoints,
        crate::handlers::endpoints::create_endpoint,
        crate::handlers::endpoints::get_endpoint,
        crate::handlers::endpoints::update_endpoint,
        crate::handlers::endpoints::delete_endpoint,
        crate::handlers::endpoints::list_mappings,
        crate::handlers::endpoints::replace_mappings,
        crate::handlers::endpoints::preview_endpoint,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::sources::SourceDto,
            crate::handlers::sources::CreateSourceRequest,
            crate::handlers::sources::UpdateSourceRequest,
            crate::handlers::sources::SyncAcceptedDto,
            crate::handlers::endpoints::EndpointDto,
            crate::handlers::endpoints::CreateEndpointRequest,
            crate::handlers::endpoints::UpdateEndpointRequest,
            crate::handlers::endpoints::MappingDto,
            crate::handlers::endpoints::MappingItemRequest,
        )
    ),
    info(
        title = "Ingestors API",
        description = "Schema-agnostic HTTP ingestion and entity reconciliation",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
