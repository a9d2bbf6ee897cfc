//! Migration to create the endpoints table.
//!
//! An endpoint is one concrete request shape (path, method, body template)
//! under a source. Sources own their endpoints exclusively, so deletes
//! cascade.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Endpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Endpoints::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Endpoints::SourceId).uuid().not_null())
                    .col(ColumnDef::new(Endpoints::Path).text().not_null())
                    .col(
                        ColumnDef::new(Endpoints::Method)
                            .text()
                            .not_null()
                            .default("GET"),
                    )
                    .col(ColumnDef::new(Endpoints::BodyTemplate).json_binary().null())
                    .col(
                        ColumnDef::new(Endpoints::ResponseShape)
                            .text()
                            .not_null()
                            .default("auto"),
                    )
                    .col(
                        ColumnDef::new(Endpoints::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Endpoints::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Endpoints::LastError).text().null())
                    .col(ColumnDef::new(Endpoints::LastEtag).text().null())
                    .col(ColumnDef::new(Endpoints::LastContentHash).text().null())
                    .col(
                        ColumnDef::new(Endpoints::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Endpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_endpoints_source_id")
                            .from(Endpoints::Table, Endpoints::SourceId)
                            .to(Sources::Table, Sources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_endpoints_source_id")
                    .table(Endpoints::Table)
                    .col(Endpoints::SourceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_endpoints_source_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Endpoints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Endpoints {
    Table,
    Id,
    SourceId,
    Path,
    Method,
    BodyTemplate,
    ResponseShape,
    Active,
    LastSyncedAt,
    LastError,
    LastEtag,
    LastContentHash,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Sources {
    Table,
    Id,
}
