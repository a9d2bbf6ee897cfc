//! Asset entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// A physical asset, upserted by its external identity (serial, code, ...)
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// External natural key, unique
    pub identity: String,

    /// Every asset belongs to an equipment type
    pub equipment_type_id: Uuid,

    pub name: Option<String>,

    pub tag: Option<String>,

    pub serial: Option<String>,

    /// Lifecycle status; defaults to `available` when unmapped
    pub status: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::equipment_type::Entity",
        from = "Column::EquipmentTypeId",
        to = "super::equipment_type::Column::Id"
    )]
    EquipmentType,
}

impl Related<super::equipment_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EquipmentType.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
