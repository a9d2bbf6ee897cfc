//! Source entity model
//!
//! A source is one external API configuration the poller drives: base URL,
//! auth mode and credentials, poll cadence, and the mutable sync bookkeeping
//! (last sync/success/error, next due time) written back after every pass.
//! Delta state (conditional-request token, content hash) lives on the
//! endpoint, since each endpoint fetches its own payload.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Source entity representing one polled external API
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sources")]
pub struct Model {
    /// Unique identifier for the source (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Operator-facing display name
    pub name: String,

    /// Base URL endpoint paths are resolved against
    pub base_url: String,

    /// Authentication mode (`none` or `bearer`)
    pub auth_mode: String,

    /// URL used only to obtain/refresh tokens; required when auth_mode is `bearer`
    pub auth_endpoint: Option<String>,

    /// Optional JSON payload sent to the auth endpoint on refresh
    #[sea_orm(column_type = "JsonBinary")]
    pub auth_payload: Option<JsonValue>,

    /// Current bearer access token. Never logged, never serialized to clients.
    pub access_token: Option<String>,

    /// Current refresh token. Never logged, never serialized to clients.
    pub refresh_token: Option<String>,

    /// Poll interval in seconds
    pub poll_interval_seconds: i64,

    /// Whether the poller considers this source at all
    pub active: bool,

    /// Timestamp of the last attempted sync
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    /// Timestamp of the last successful sync
    pub last_success_at: Option<DateTimeWithTimeZone>,

    /// Text of the last sync error, cleared on success
    pub last_error: Option<String>,

    /// When the next scheduled pass is due
    pub next_sync_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the source was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the source was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::endpoint::Entity")]
    Endpoint,
}

impl Related<super::endpoint::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Endpoint.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
