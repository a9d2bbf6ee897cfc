//! Migration to create the sources table.
//!
//! A source row describes one external API: where it lives, how to
//! authenticate against it, and the sync bookkeeping the poller maintains.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sources::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Sources::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Sources::Name).text().not_null())
                    .col(ColumnDef::new(Sources::BaseUrl).text().not_null())
                    .col(
                        ColumnDef::new(Sources::AuthMode)
                            .text()
                            .not_null()
                            .default("none"),
                    )
                    .col(ColumnDef::new(Sources::AuthEndpoint).text().null())
                    .col(ColumnDef::new(Sources::AuthPayload).json_binary().null())
                    .col(ColumnDef::new(Sources::AccessToken).text().null())
                    .col(ColumnDef::new(Sources::RefreshToken).text().null())
                    .col(
                        ColumnDef::new(Sources::PollIntervalSeconds)
                            .big_integer()
                            .not_null()
                            .default(900),
                    )
                    .col(
                        ColumnDef::new(Sources::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Sources::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Sources::LastSuccessAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Sources::LastError).text().null())
                    .col(
                        ColumnDef::new(Sources::NextSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Sources::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Sources::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Poller sweep filters on active sources ordered by due time
        manager
            .create_index(
                Index::create()
                    .name("idx_sources_active_next_sync_at")
                    .table(Sources::Table)
                    .col(Sources::Active)
                    .col(Sources::NextSyncAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sources_active_next_sync_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Sources::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Sources {
    Table,
    Id,
    Name,
    BaseUrl,
    AuthMode,
    AuthEndpoint,
    AuthPayload,
    AccessToken,
    RefreshToken,
    PollIntervalSeconds,
    Active,
    LastSyncedAt,
    LastSuccessAt,
    LastError,
    NextSyncAt,
    CreatedAt,
    UpdatedAt,
}
