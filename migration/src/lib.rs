//! Database migrations for the Ingestors service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000100_create_sources;
mod m2025_06_01_000200_create_endpoints;
mod m2025_06_01_000300_create_mappings;
mod m2025_06_01_000400_create_entity_tables;
mod m2025_06_01_000500_create_outbox_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000100_create_sources::Migration),
            Box::new(m2025_06_01_000200_create_endpoints::Migration),
            Box::new(m2025_06_01_000300_create_mappings::Migration),
            Box::new(m2025_06_01_000400_create_entity_tables::Migration),
            Box::new(m2025_06_01_000500_create_outbox_events::Migration),
        ]
    }
}
