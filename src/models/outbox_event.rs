//! Outbox event entity model
//!
//! Domain events appended by the ingestion engine; delivery and retry are an
//! external worker's responsibility.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Event kind, e.g. `asset.state_transitioned`
    pub kind: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    pub created_at: DateTimeWithTimeZone,

    /// Set by the delivery worker, never by this service
    pub delivered_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
