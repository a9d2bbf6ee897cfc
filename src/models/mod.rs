//! # Data Models
//!
//! SeaORM entity models for the Ingestors service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod asset;
pub mod endpoint;
pub mod equipment_type;
pub mod mapping;
pub mod organization;
pub mod outbox_event;
pub mod person;
pub mod place;
pub mod source;

pub use asset::Entity as Asset;
pub use endpoint::Entity as Endpoint;
pub use equipment_type::Entity as EquipmentType;
pub use mapping::Entity as Mapping;
pub use organization::Entity as Organization;
pub use outbox_event::Entity as OutboxEvent;
pub use person::Entity as Person;
pub use place::Entity as Place;
pub use source::Entity as Source;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "ingestors".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
