//! Entity repository for the five reconciliation targets
//!
//! Identity-keyed upserts: an existing row matching the natural key is
//! updated in place, otherwise a new row is created. Only fields the caller
//! actually mapped are written on update, so sparse payloads never blank
//! out previously ingested data.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::asset::{self, Entity as Asset};
use crate::models::equipment_type::{self, Entity as EquipmentType};
use crate::models::organization::{self, Entity as Organization};
use crate::models::person::{self, Entity as Person};
use crate::models::place::{self, Entity as Place};

/// Fields extracted for an equipment type upsert
#[derive(Debug, Clone, Default)]
pub struct EquipmentTypeRecord {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub active: Option<bool>,
}

/// Fields extracted for an asset upsert
#[derive(Debug, Clone)]
pub struct AssetRecord {
    pub identity: String,
    pub equipment_type_id: Uuid,
    pub name: Option<String>,
    pub tag: Option<String>,
    pub serial: Option<String>,
    pub status: Option<String>,
}

/// Fields extracted for an organization upsert
#[derive(Debug, Clone, Default)]
pub struct OrganizationRecord {
    pub identity: String,
    pub name: String,
    pub kind: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Fields extracted for a person upsert
#[derive(Debug, Clone, Default)]
pub struct PersonRecord {
    pub identity: String,
    pub given_name: String,
    pub family_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub organization: Option<String>,
}

/// Fields extracted for a place upsert
#[derive(Debug, Clone, Default)]
pub struct PlaceRecord {
    pub identity: String,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// An asset status change observed during upsert, reported so the
/// orchestrator can append an outbox event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub asset_id: Uuid,
    pub from: String,
    pub to: String,
}

/// Repository for upserts against the five reconciliation target tables
#[derive(Debug, Clone)]
pub struct EntityRepository {
    pub db: Arc<DatabaseConnection>,
}

impl EntityRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists all active equipment types; used to warm the per-pass type cache
    pub async fn list_active_equipment_types(&self) -> Result<Vec<equipment_type::Model>, DbErr> {
        EquipmentType::find()
            .filter(equipment_type::Column::Active.eq(true))
            .all(&*self.db)
            .await
    }

    pub async fn find_equipment_type_by_code(
        &self,
        code: &str,
    ) -> Result<Option<equipment_type::Model>, DbErr> {
        EquipmentType::find()
            .filter(equipment_type::Column::Code.eq(code))
            .one(&*self.db)
            .await
    }

    pub async fn find_equipment_type_by_name(
        &self,
        name: &str,
    ) -> Result<Option<equipment_type::Model>, DbErr> {
        EquipmentType::find()
            .filter(equipment_type::Column::Name.eq(name))
            .one(&*self.db)
            .await
    }

    /// Upsert an equipment type by code
    pub async fn upsert_equipment_type(
        &self,
        record: EquipmentTypeRecord,
    ) -> Result<equipment_type::Model, DbErr> {
        let now = Utc::now();

        if let Some(existing) = self.find_equipment_type_by_code(&record.code).await? {
            let mut model: equipment_type::ActiveModel = existing.into();
            model.name = Set(record.name);
            if record.description.is_some() {
                model.description = Set(record.description);
            }
            if let Some(active) = record.active {
                model.active = Set(active);
            }
            model.updated_at = Set(now.into());
            return model.update(&*self.db).await;
        }

        let model = equipment_type::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(record.code),
            name: Set(record.name),
            description: Set(record.description),
            // Active by default unless the mapping says otherwise
            active: Set(record.active.unwrap_or(true)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        model.insert(&*self.db).await
    }

    /// Upsert an asset by identity, reporting any status transition
    pub async fn upsert_asset(
        &self,
        record: AssetRecord,
    ) -> Result<(asset::Model, Option<StatusTransition>), DbErr> {
        let now = Utc::now();

        let existing = Asset::find()
            .filter(asset::Column::Identity.eq(record.identity.as_str()))
            .one(&*self.db)
            .await?;

        if let Some(existing) = existing {
            let previous_status = existing.status.clone();
            let asset_id = existing.id;

            let mut model: asset::ActiveModel = existing.into();
            model.equipment_type_id = Set(record.equipment_type_id);
            if record.name.is_some() {
                model.name = Set(record.name);
            }
            if record.tag.is_some() {
                model.tag = Set(record.tag);
            }
            if record.serial.is_some() {
                model.serial = Set(record.serial);
            }
            if let Some(status) = record.status.clone() {
                model.status = Set(status);
            }
            model.updated_at = Set(now.into());

            let updated = model.update(&*self.db).await?;

            let transition = (updated.status != previous_status).then(|| StatusTransition {
                asset_id,
                from: previous_status,
                to: updated.status.clone(),
            });
            return Ok((updated, transition));
        }

        let model = asset::ActiveModel {
            id: Set(Uuid::new_v4()),
            identity: Set(record.identity),
            equipment_type_id: Set(record.equipment_type_id),
            name: Set(record.name),
            tag: Set(record.tag),
            serial: Set(record.serial),
            status: Set(record.status.unwrap_or_else(|| "available".to_string())),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        let created = model.insert(&*self.db).await?;
        Ok((created, None))
    }

    /// Upsert an organization by identity
    pub async fn upsert_organization(
        &self,
        record: OrganizationRecord,
    ) -> Result<organization::Model, DbErr> {
        let now = Utc::now();

        let existing = Organization::find()
            .filter(organization::Column::Identity.eq(record.identity.as_str()))
            .one(&*self.db)
            .await?;

        if let Some(existing) = existing {
            let mut model: organization::ActiveModel = existing.into();
            model.name = Set(record.name);
            if record.kind.is_some() {
                model.kind = Set(record.kind);
            }
            if record.email.is_some() {
                model.email = Set(record.email);
            }
            if record.phone.is_some() {
                model.phone = Set(record.phone);
            }
            model.updated_at = Set(now.into());
            return model.update(&*self.db).await;
        }

        let model = organization::ActiveModel {
            id: Set(Uuid::new_v4()),
            identity: Set(record.identity),
            name: Set(record.name),
            kind: Set(record.kind),
            email: Set(record.email),
            phone: Set(record.phone),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        model.insert(&*self.db).await
    }

    /// Upsert a person by identity
    pub async fn upsert_person(&self, record: PersonRecord) -> Result<person::Model, DbErr> {
        let now = Utc::now();

        let existing = Person::find()
            .filter(person::Column::Identity.eq(record.identity.as_str()))
            .one(&*self.db)
            .await?;

        if let Some(existing) = existing {
            let mut model: person::ActiveModel = existing.into();
            model.given_name = Set(record.given_name);
            model.family_name = Set(record.family_name);
            if record.email.is_some() {
                model.email = Set(record.email);
            }
            if record.phone.is_some() {
                model.phone = Set(record.phone);
            }
            if record.organization.is_some() {
                model.organization = Set(record.organization);
            }
            model.updated_at = Set(now.into());
            return model.update(&*self.db).await;
        }

        let model = person::ActiveModel {
            id: Set(Uuid::new_v4()),
            identity: Set(record.identity),
            given_name: Set(record.given_name),
            family_name: Set(record.family_name),
            email: Set(record.email),
            phone: Set(record.phone),
            organization: Set(record.organization),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        model.insert(&*self.db).await
    }

    /// Upsert a place by identity
    pub async fn upsert_place(&self, record: PlaceRecord) -> Result<place::Model, DbErr> {
        let now = Utc::now();

        let existing = Place::find()
            .filter(place::Column::Identity.eq(record.identity.as_str()))
            .one(&*self.db)
            .await?;

        if let Some(existing) = existing {
            let mut model: place::ActiveModel = existing.into();
            model.name = Set(record.name);
            if record.address.is_some() {
                model.address = Set(record.address);
            }
            if record.city.is_some() {
                model.city = Set(record.city);
            }
            if record.country.is_some() {
                model.country = Set(record.country);
            }
            model.updated_at = Set(now.into());
            return model.update(&*self.db).await;
        }

        let model = place::ActiveModel {
            id: Set(Uuid::new_v4()),
            identity: Set(record.identity),
            name: Set(record.name),
            address: Set(record.address),
            city: Set(record.city),
            country: Set(record.country),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        model.insert(&*self.db).await
    }
}
