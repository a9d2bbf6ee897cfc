//! Migration to create the mappings table.
//!
//! A mapping is one declarative extraction rule: a path expression into a
//! raw item, the target entity kind and field it feeds, and whether it
//! carries the identity used for upsert matching.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Mappings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Mappings::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Mappings::EndpointId).uuid().not_null())
                    .col(ColumnDef::new(Mappings::PathExpr).text().not_null())
                    .col(ColumnDef::new(Mappings::TargetKind).text().not_null())
                    .col(ColumnDef::new(Mappings::TargetField).text().not_null())
                    .col(
                        ColumnDef::new(Mappings::IsIdentity)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Mappings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mappings_endpoint_id")
                            .from(Mappings::Table, Mappings::EndpointId)
                            .to(Endpoints::Table, Endpoints::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_mappings_endpoint_id")
                    .table(Mappings::Table)
                    .col(Mappings::EndpointId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_mappings_endpoint_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Mappings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Mappings {
    Table,
    Id,
    EndpointId,
    PathExpr,
    TargetKind,
    TargetField,
    IsIdentity,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Endpoints {
    Table,
    Id,
}
