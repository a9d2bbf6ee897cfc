//! Outbox repository
//!
//! Append-only access to the outbox table. The ingestion engine only ever
//! appends; delivery and retry belong to an external worker.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DbErr, Set};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::outbox_event;

/// Event kind appended when an asset changes lifecycle status during ingest
pub const EVENT_ASSET_STATE_TRANSITIONED: &str = "asset.state_transitioned";

#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pub db: Arc<DatabaseConnection>,
}

impl OutboxRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append one event for asynchronous delivery
    pub async fn append(&self, kind: &str, payload: JsonValue) -> Result<outbox_event::Model, DbErr> {
        let model = outbox_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            kind: Set(kind.to_string()),
            payload: Set(payload),
            created_at: Set(Utc::now().into()),
            delivered_at: Set(None),
        };
        model.insert(&*self.db).await
    }
}
