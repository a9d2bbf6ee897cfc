//! Migration to create the five reconciliation target tables.
//!
//! Equipment types, assets, organizations, people, and places are the
//! entities ingested items resolve into. Each table keyed for upsert
//! matching: equipment types by code, the rest by an external identity
//! column (serial number, external code, and so on).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EquipmentTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EquipmentTypes::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(EquipmentTypes::Code).text().not_null())
                    .col(ColumnDef::new(EquipmentTypes::Name).text().not_null())
                    .col(ColumnDef::new(EquipmentTypes::Description).text().null())
                    .col(
                        ColumnDef::new(EquipmentTypes::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(EquipmentTypes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(EquipmentTypes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_equipment_types_code")
                    .table(EquipmentTypes::Table)
                    .col(EquipmentTypes::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Assets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Assets::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Assets::Identity).text().not_null())
                    .col(ColumnDef::new(Assets::EquipmentTypeId).uuid().not_null())
                    .col(ColumnDef::new(Assets::Name).text().null())
                    .col(ColumnDef::new(Assets::Tag).text().null())
                    .col(ColumnDef::new(Assets::Serial).text().null())
                    .col(
                        ColumnDef::new(Assets::Status)
                            .text()
                            .not_null()
                            .default("available"),
                    )
                    .col(
                        ColumnDef::new(Assets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Assets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_assets_equipment_type_id")
                            .from(Assets::Table, Assets::EquipmentTypeId)
                            .to(EquipmentTypes::Table, EquipmentTypes::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_assets_identity")
                    .table(Assets::Table)
                    .col(Assets::Identity)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Organizations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Organizations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Organizations::Identity).text().not_null())
                    .col(ColumnDef::new(Organizations::Name).text().not_null())
                    .col(ColumnDef::new(Organizations::Kind).text().null())
                    .col(ColumnDef::new(Organizations::Email).text().null())
                    .col(ColumnDef::new(Organizations::Phone).text().null())
                    .col(
                        ColumnDef::new(Organizations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Organizations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_organizations_identity")
                    .table(Organizations::Table)
                    .col(Organizations::Identity)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(People::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(People::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(People::Identity).text().not_null())
                    .col(ColumnDef::new(People::GivenName).text().not_null())
                    .col(ColumnDef::new(People::FamilyName).text().not_null())
                    .col(ColumnDef::new(People::Email).text().null())
                    .col(ColumnDef::new(People::Phone).text().null())
                    .col(ColumnDef::new(People::Organization).text().null())
                    .col(
                        ColumnDef::new(People::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(People::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_people_identity")
                    .table(People::Table)
                    .col(People::Identity)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Places::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Places::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Places::Identity).text().not_null())
                    .col(ColumnDef::new(Places::Name).text().not_null())
                    .col(ColumnDef::new(Places::Address).text().null())
                    .col(ColumnDef::new(Places::City).text().null())
                    .col(ColumnDef::new(Places::Country).text().null())
                    .col(
                        ColumnDef::new(Places::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Places::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_places_identity")
                    .table(Places::Table)
                    .col(Places::Identity)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Places::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(People::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Organizations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Assets::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EquipmentTypes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum EquipmentTypes {
    Table,
    Id,
    Code,
    Name,
    Description,
    Active,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Assets {
    Table,
    Id,
    Identity,
    EquipmentTypeId,
    Name,
    Tag,
    Serial,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Organizations {
    Table,
    Id,
    Identity,
    Name,
    Kind,
    Email,
    Phone,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum People {
    Table,
    Id,
    Identity,
    GivenName,
    FamilyName,
    Email,
    Phone,
    Organization,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Places {
    Table,
    Id,
    Identity,
    Name,
    Address,
    City,
    Country,
    CreatedAt,
    UpdatedAt,
}
