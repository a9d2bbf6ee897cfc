//! Entity resolution and upsert dispatch
//!
//! Takes a mapped item, dispatches on its target kind, assembles the
//! kind-specific record, and hands it to the entity repository for an
//! identity-keyed upsert. Asset items additionally resolve their equipment
//! type through a per-pass cache so a payload with a thousand assets of the
//! same type touches the type table once.

use std::collections::HashMap;

use metrics::counter;
use tracing::debug;
use uuid::Uuid;

use crate::error::ItemError;
use crate::ingest::mapper::MappedItem;
use crate::models::equipment_type;
use crate::repositories::entities::{
    AssetRecord, EntityRepository, EquipmentTypeRecord, OrganizationRecord, PersonRecord,
    PlaceRecord, StatusTransition,
};

/// The closed set of reconciliation targets a mapping may point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    EquipmentType,
    Asset,
    Organization,
    Person,
    Place,
}

impl TargetKind {
    /// Parse the kind string stored on a mapping row.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "equipment_type" => Some(TargetKind::EquipmentType),
            "asset" => Some(TargetKind::Asset),
            "organization" => Some(TargetKind::Organization),
            "person" => Some(TargetKind::Person),
            "place" => Some(TargetKind::Place),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::EquipmentType => "equipment_type",
            TargetKind::Asset => "asset",
            TargetKind::Organization => "organization",
            TargetKind::Person => "person",
            TargetKind::Place => "place",
        }
    }
}

/// Per-pass equipment type lookup cache.
///
/// Keys are lowercased codes and names; both point at the same type id.
/// Warmed from the active types once per pass and extended whenever a type
/// is created on demand, so repeated references within one payload never
/// re-query.
#[derive(Debug, Default)]
pub struct TypeCache {
    by_code: HashMap<String, Uuid>,
    by_name: HashMap<String, Uuid>,
}

impl TypeCache {
    /// Warm the cache from the active equipment types.
    pub async fn warm(entities: &EntityRepository) -> Result<Self, sea_orm::DbErr> {
        let mut cache = Self::default();
        for model in entities.list_active_equipment_types().await? {
            cache.insert(&model);
        }
        Ok(cache)
    }

    pub fn insert(&mut self, model: &equipment_type::Model) {
        self.by_code.insert(model.code.to_lowercase(), model.id);
        self.by_name.insert(model.name.to_lowercase(), model.id);
    }

    pub fn lookup_code(&self, code: &str) -> Option<Uuid> {
        self.by_code.get(&code.to_lowercase()).copied()
    }

    pub fn lookup_name(&self, name: &str) -> Option<Uuid> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Dispatches mapped items into identity-keyed upserts.
#[derive(Debug, Clone)]
pub struct EntityResolver {
    entities: EntityRepository,
}

impl EntityResolver {
    pub fn new(entities: EntityRepository) -> Self {
        Self { entities }
    }

    /// Upsert one mapped item into its target table.
    ///
    /// Returns the asset status transition when one occurred, so the caller
    /// can append the corresponding outbox event.
    pub async fn resolve(
        &self,
        cache: &mut TypeCache,
        item: &MappedItem,
    ) -> Result<Option<StatusTransition>, ItemError> {
        counter!("ingest_items_resolved_total", "kind" => item.kind.as_str()).increment(1);

        match item.kind {
            TargetKind::EquipmentType => {
                // The identity doubles as the code unless one is mapped explicitly
                let code = item
                    .string_field("code")
                    .unwrap_or_else(|| item.identity.clone());
                let model = self
                    .entities
                    .upsert_equipment_type(EquipmentTypeRecord {
                        name: item.string_field("name").unwrap_or_else(|| code.clone()),
                        code,
                        description: item.string_field("description"),
                        active: item.fields.get("active").and_then(|v| v.as_bool()),
                    })
                    .await?;
                cache.insert(&model);
                Ok(None)
            }
            TargetKind::Asset => {
                let equipment_type_id = self.resolve_equipment_type(cache, item).await?;
                let (_, transition) = self
                    .entities
                    .upsert_asset(AssetRecord {
                        identity: item.identity.clone(),
                        equipment_type_id,
                        name: item.string_field("name"),
                        tag: item.string_field("tag"),
                        serial: item.string_field("serial"),
                        status: item.string_field("status"),
                    })
                    .await?;
                Ok(transition)
            }
            TargetKind::Organization => {
                self.entities
                    .upsert_organization(OrganizationRecord {
                        identity: item.identity.clone(),
                        name: item
                            .string_field("name")
                            .ok_or(ItemError::MissingRequiredField("name"))?,
                        kind: item.string_field("kind"),
                        email: item.string_field("email"),
                        phone: item.string_field("phone"),
                    })
                    .await?;
                Ok(None)
            }
            TargetKind::Person => {
                self.entities
                    .upsert_person(PersonRecord {
                        identity: item.identity.clone(),
                        given_name: item
                            .string_field("given_name")
                            .ok_or(ItemError::MissingRequiredField("given_name"))?,
                        family_name: item
                            .string_field("family_name")
                            .ok_or(ItemError::MissingRequiredField("family_name"))?,
                        email: item.string_field("email"),
                        phone: item.string_field("phone"),
                        organization: item.string_field("organization"),
                    })
                    .await?;
                Ok(None)
            }
            TargetKind::Place => {
                self.entities
                    .upsert_place(PlaceRecord {
                        identity: item.identity.clone(),
                        name: item
                            .string_field("name")
                            .ok_or(ItemError::MissingRequiredField("name"))?,
                        address: item.string_field("address"),
                        city: item.string_field("city"),
                        country: item.string_field("country"),
                    })
                    .await?;
                Ok(None)
            }
        }
    }

    /// Resolve an asset's equipment type to a row id.
    ///
    /// Tried in order: a directly mapped id, the cache by code, the cache
    /// by name (falling back to the table for types the warm pass skipped),
    /// then create-on-demand from whatever code or name the item carried.
    /// Only an asset with no type field at all is unprocessable.
    async fn resolve_equipment_type(
        &self,
        cache: &mut TypeCache,
        item: &MappedItem,
    ) -> Result<Uuid, ItemError> {
        if let Some(raw_id) = item.string_field("equipment_type_id")
            && let Ok(id) = Uuid::parse_str(&raw_id)
        {
            return Ok(id);
        }

        let code = item.string_field("equipment_type_code");
        let name = item.string_field("equipment_type_name");

        if let Some(code) = &code
            && let Some(id) = cache.lookup_code(code)
        {
            return Ok(id);
        }

        if let Some(name) = &name {
            if let Some(id) = cache.lookup_name(name) {
                return Ok(id);
            }
            // The warm pass only loads active types; an inactive match
            // still resolves instead of spawning a duplicate.
            if let Some(model) = self.entities.find_equipment_type_by_name(name).await? {
                cache.insert(&model);
                return Ok(model.id);
            }
        }

        // Unknown type: create it on demand so the asset lands.
        let (code, name) = match (code, name) {
            (Some(code), Some(name)) => (code, name),
            (Some(code), None) => (code.clone(), code),
            (None, Some(name)) => (name.to_lowercase(), name),
            (None, None) => return Err(ItemError::UnresolvableEquipmentType),
        };
        debug!(code = %code, "Creating equipment type on demand");
        counter!("ingest_equipment_types_created_total").increment(1);
        let model = self
            .entities
            .upsert_equipment_type(EquipmentTypeRecord {
                code,
                name,
                description: None,
                active: None,
            })
            .await?;
        cache.insert(&model);
        Ok(model.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn parses_the_closed_kind_set() {
        assert_eq!(
            TargetKind::parse("equipment_type"),
            Some(TargetKind::EquipmentType)
        );
        assert_eq!(TargetKind::parse("asset"), Some(TargetKind::Asset));
        assert_eq!(
            TargetKind::parse("organization"),
            Some(TargetKind::Organization)
        );
        assert_eq!(TargetKind::parse("person"), Some(TargetKind::Person));
        assert_eq!(TargetKind::parse("place"), Some(TargetKind::Place));
        assert_eq!(TargetKind::parse("Asset"), None);
        assert_eq!(TargetKind::parse("widget"), None);
    }

    #[test]
    fn kind_round_trips_through_as_str() {
        for kind in [
            TargetKind::EquipmentType,
            TargetKind::Asset,
            TargetKind::Organization,
            TargetKind::Person,
            TargetKind::Place,
        ] {
            assert_eq!(TargetKind::parse(kind.as_str()), Some(kind));
        }
    }

    fn equipment_type_model(code: &str, name: &str) -> equipment_type::Model {
        equipment_type::Model {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            description: None,
            active: true,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[test]
    fn cache_lookups_are_case_insensitive() {
        let model = equipment_type_model("FORKLIFT", "Forklift Class II");
        let mut cache = TypeCache::default();
        cache.insert(&model);

        assert_eq!(cache.lookup_code("forklift"), Some(model.id));
        assert_eq!(cache.lookup_name("FORKLIFT CLASS II"), Some(model.id));
        assert_eq!(cache.lookup_code("pallet-jack"), None);
    }

    #[test]
    fn cache_tracks_insertions() {
        let mut cache = TypeCache::default();
        assert!(cache.is_empty());
        cache.insert(&equipment_type_model("a", "A"));
        cache.insert(&equipment_type_model("b", "B"));
        assert_eq!(cache.len(), 2);
    }
}
