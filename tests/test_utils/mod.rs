//! Test utilities for database-backed tests.
//!
//! Sets up in-memory SQLite databases with migrations applied and provides
//! fixture builders for sources, endpoints, and mappings.

use anyhow::Result;
use chrono::Utc;
use ingestors::config::PollerConfig;
use ingestors::ingest::SyncOrchestrator;
use ingestors::migration::{Migrator, MigratorTrait};
use ingestors::models::{endpoint, mapping, source};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<Arc<DatabaseConnection>> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(Arc::new(db))
}

/// Builds an orchestrator over the test database with default settings.
pub fn test_orchestrator(db: Arc<DatabaseConnection>) -> SyncOrchestrator {
    SyncOrchestrator::new(reqwest::Client::new(), db, PollerConfig::default())
}

/// Options for a test source fixture.
pub struct SourceFixture {
    pub base_url: String,
    pub auth_mode: String,
    pub auth_endpoint: Option<String>,
    pub auth_payload: Option<JsonValue>,
    pub access_token: Option<String>,
}

impl SourceFixture {
    pub fn unauthenticated(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            auth_mode: "none".to_string(),
            auth_endpoint: None,
            auth_payload: None,
            access_token: None,
        }
    }

    pub fn bearer(base_url: &str, auth_endpoint: &str, access_token: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            auth_mode: "bearer".to_string(),
            auth_endpoint: Some(auth_endpoint.to_string()),
            auth_payload: None,
            access_token: Some(access_token.to_string()),
        }
    }
}

/// Inserts a source row and returns the model.
pub async fn insert_source(
    db: &DatabaseConnection,
    fixture: SourceFixture,
) -> Result<source::Model> {
    let now = Utc::now();
    let model = source::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(format!("source-{}", Uuid::new_v4())),
        base_url: Set(fixture.base_url),
        auth_mode: Set(fixture.auth_mode),
        auth_endpoint: Set(fixture.auth_endpoint),
        auth_payload: Set(fixture.auth_payload),
        access_token: Set(fixture.access_token),
        refresh_token: Set(None),
        poll_interval_seconds: Set(900),
        active: Set(true),
        last_synced_at: Set(None),
        last_success_at: Set(None),
        last_error: Set(None),
        next_sync_at: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    Ok(model.insert(db).await?)
}

/// Inserts an endpoint row under a source.
pub async fn insert_endpoint(
    db: &DatabaseConnection,
    source_id: Uuid,
    path: &str,
    method: &str,
    response_shape: &str,
    body_template: Option<JsonValue>,
) -> Result<endpoint::Model> {
    let now = Utc::now();
    let model = endpoint::ActiveModel {
        id: Set(Uuid::new_v4()),
        source_id: Set(source_id),
        path: Set(path.to_string()),
        method: Set(method.to_string()),
        body_template: Set(body_template),
        response_shape: Set(response_shape.to_string()),
        active: Set(true),
        last_synced_at: Set(None),
        last_error: Set(None),
        last_etag: Set(None),
        last_content_hash: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    };
    Ok(model.insert(db).await?)
}

/// Inserts one mapping; `order` staggers created_at to fix evaluation order.
pub async fn insert_mapping(
    db: &DatabaseConnection,
    endpoint_id: Uuid,
    path_expr: &str,
    target_kind: &str,
    target_field: &str,
    is_identity: bool,
    order: i64,
) -> Result<mapping::Model> {
    let created_at = Utc::now() + chrono::Duration::milliseconds(order);
    let model = mapping::ActiveModel {
        id: Set(Uuid::new_v4()),
        endpoint_id: Set(endpoint_id),
        path_expr: Set(path_expr.to_string()),
        target_kind: Set(target_kind.to_string()),
        target_field: Set(target_field.to_string()),
        is_identity: Set(is_identity),
        created_at: Set(created_at.into()),
    };
    Ok(model.insert(db).await?)
}
