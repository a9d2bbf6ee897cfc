//! Endpoint entity model
//!
//! One concrete request shape under a source: relative path, HTTP method,
//! optional literal body template, and a response-shape strategy telling the
//! orchestrator how to split the payload into items.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "endpoints")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning source (cascade delete)
    pub source_id: Uuid,

    /// Path relative to the source base URL
    pub path: String,

    /// HTTP method for the fetch request
    pub method: String,

    /// Literal request body template; JSON `null` on a GET means "send no body"
    #[sea_orm(column_type = "JsonBinary")]
    pub body_template: Option<JsonValue>,

    /// Response shape strategy: `single`, `list`, or `auto`
    pub response_shape: String,

    pub active: bool,

    /// Per-endpoint sync bookkeeping mirroring the source's
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    pub last_error: Option<String>,

    /// Last conditional-request token (ETag-equivalent) this endpoint saw
    pub last_etag: Option<String>,

    /// Hex digest of the last payload this endpoint processed
    pub last_content_hash: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::source::Entity",
        from = "Column::SourceId",
        to = "super::source::Column::Id"
    )]
    Source,
    #[sea_orm(has_many = "super::mapping::Entity")]
    Mapping,
}

impl Related<super::source::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Source.def()
    }
}

impl Related<super::mapping::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Mapping.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
