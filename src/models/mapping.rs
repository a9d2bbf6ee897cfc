//! Mapping entity model
//!
//! A declarative rule extracting one field from a raw item into one target
//! entity field. Identity-flagged mappings supply the natural key used for
//! create-vs-update matching.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "mappings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning endpoint (cascade delete)
    pub endpoint_id: Uuid,

    /// Path expression evaluated against one decoded item
    pub path_expr: String,

    /// Target entity kind: equipment_type, asset, organization, person, place
    pub target_kind: String,

    /// Field name within the target entity
    pub target_field: String,

    /// Whether this mapping supplies the upsert identity
    pub is_identity: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::endpoint::Entity",
        from = "Column::EndpointId",
        to = "super::endpoint::Column::Id"
    )]
    Endpoint,
}

impl Related<super::endpoint::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Endpoint.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
