//! Source repository for database operations
//!
//! Encapsulates SeaORM operations for sources, their endpoints, and their
//! mappings. The sync bookkeeping writers (`persist_tokens`,
//! `record_failure`, `record_success`) each issue one UPDATE so a cancelled
//! pass never leaves token or hash state half-written.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::endpoint::{self, Entity as Endpoint};
use crate::models::mapping::{self, Entity as Mapping};
use crate::models::source::{self, Entity as Source};

/// Repository for source, endpoint, and mapping database operations
#[derive(Debug, Clone)]
pub struct SourceRepository {
    pub db: Arc<DatabaseConnection>,
}

impl SourceRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Finds a source by its identifier
    pub async fn get(&self, id: Uuid) -> Result<Option<source::Model>, DbErr> {
        Source::find_by_id(id).one(&*self.db).await
    }

    /// Lists all sources ordered by name
    pub async fn list_all(&self) -> Result<Vec<source::Model>, DbErr> {
        Source::find()
            .order_by_asc(source::Column::Name)
            .all(&*self.db)
            .await
    }

    /// Lists active sources due for a sync pass at `now`.
    ///
    /// A source with no `next_sync_at` yet (never synced) is always due.
    pub async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<source::Model>, DbErr> {
        Source::find()
            .filter(source::Column::Active.eq(true))
            .filter(
                Condition::any()
                    .add(source::Column::NextSyncAt.is_null())
                    .add(source::Column::NextSyncAt.lte(now)),
            )
            .order_by_asc(source::Column::NextSyncAt)
            .all(&*self.db)
            .await
    }

    /// Creates a new source
    pub async fn create(&self, model: source::ActiveModel) -> Result<source::Model, DbErr> {
        model.insert(&*self.db).await
    }

    /// Applies an update to an existing source
    pub async fn update(&self, model: source::ActiveModel) -> Result<source::Model, DbErr> {
        model.update(&*self.db).await
    }

    /// Deletes a source; endpoints and mappings cascade
    pub async fn delete(&self, id: Uuid) -> Result<u64, DbErr> {
        let result = Source::delete_by_id(id).exec(&*self.db).await?;
        Ok(result.rows_affected)
    }

    /// Persist freshly discovered tokens onto the source row.
    ///
    /// Single atomic write; called by the auth session after a successful
    /// refresh and nowhere else.
    pub async fn persist_tokens(
        &self,
        source_id: Uuid,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<(), DbErr> {
        let mut model = source::ActiveModel {
            id: Set(source_id),
            access_token: Set(Some(access_token)),
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        if refresh_token.is_some() {
            model.refresh_token = Set(refresh_token);
        }
        model.update(&*self.db).await?;
        Ok(())
    }

    /// Record a failed pass: last error text plus the next scheduled attempt.
    pub async fn record_failure(
        &self,
        source_id: Uuid,
        error: &str,
        now: DateTime<Utc>,
        next_sync_at: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        let model = source::ActiveModel {
            id: Set(source_id),
            last_synced_at: Set(Some(now.into())),
            last_error: Set(Some(error.to_string())),
            next_sync_at: Set(Some(next_sync_at.into())),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        model.update(&*self.db).await?;
        Ok(())
    }

    /// Record a successful pass: cleared error, success stamp, next run time.
    pub async fn record_success(
        &self,
        source_id: Uuid,
        now: DateTime<Utc>,
        next_sync_at: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        let model = source::ActiveModel {
            id: Set(source_id),
            last_synced_at: Set(Some(now.into())),
            last_success_at: Set(Some(now.into())),
            last_error: Set(None),
            next_sync_at: Set(Some(next_sync_at.into())),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        model.update(&*self.db).await?;
        Ok(())
    }

    /// Finds an endpoint by its identifier
    pub async fn get_endpoint(&self, id: Uuid) -> Result<Option<endpoint::Model>, DbErr> {
        Endpoint::find_by_id(id).one(&*self.db).await
    }

    /// Lists active endpoints belonging to a source
    pub async fn active_endpoints(&self, source_id: Uuid) -> Result<Vec<endpoint::Model>, DbErr> {
        Endpoint::find()
            .filter(endpoint::Column::SourceId.eq(source_id))
            .filter(endpoint::Column::Active.eq(true))
            .order_by_asc(endpoint::Column::CreatedAt)
            .all(&*self.db)
            .await
    }

    /// Lists all endpoints belonging to a source
    pub async fn endpoints_for_source(
        &self,
        source_id: Uuid,
    ) -> Result<Vec<endpoint::Model>, DbErr> {
        Endpoint::find()
            .filter(endpoint::Column::SourceId.eq(source_id))
            .order_by_asc(endpoint::Column::CreatedAt)
            .all(&*self.db)
            .await
    }

    /// Creates a new endpoint under a source
    pub async fn create_endpoint(
        &self,
        model: endpoint::ActiveModel,
    ) -> Result<endpoint::Model, DbErr> {
        model.insert(&*self.db).await
    }

    /// Applies an update to an existing endpoint
    pub async fn update_endpoint(
        &self,
        model: endpoint::ActiveModel,
    ) -> Result<endpoint::Model, DbErr> {
        model.update(&*self.db).await
    }

    /// Deletes an endpoint; mappings cascade
    pub async fn delete_endpoint(&self, id: Uuid) -> Result<u64, DbErr> {
        let result = Endpoint::delete_by_id(id).exec(&*self.db).await?;
        Ok(result.rows_affected)
    }

    /// Record per-endpoint bookkeeping after a pass touched it.
    ///
    /// Hash and etag are the endpoint's delta state; they are only written
    /// when the pass produced fresh values, so a not-modified answer keeps
    /// the stored ones.
    pub async fn record_endpoint_outcome(
        &self,
        endpoint_id: Uuid,
        error: Option<&str>,
        content_hash: Option<String>,
        etag: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DbErr> {
        let mut model = endpoint::ActiveModel {
            id: Set(endpoint_id),
            last_synced_at: Set(Some(now.into())),
            last_error: Set(error.map(|e| e.to_string())),
            updated_at: Set(now.into()),
            ..Default::default()
        };
        if content_hash.is_some() {
            model.last_content_hash = Set(content_hash);
        }
        if etag.is_some() {
            model.last_etag = Set(etag);
        }
        model.update(&*self.db).await?;
        Ok(())
    }

    /// Lists mappings for an endpoint in creation order.
    ///
    /// Creation order matters: when several identity mappings exist, the
    /// first that resolves wins.
    pub async fn mappings_for_endpoint(
        &self,
        endpoint_id: Uuid,
    ) -> Result<Vec<mapping::Model>, DbErr> {
        Mapping::find()
            .filter(mapping::Column::EndpointId.eq(endpoint_id))
            .order_by_asc(mapping::Column::CreatedAt)
            .order_by_asc(mapping::Column::Id)
            .all(&*self.db)
            .await
    }

    /// Replaces the full mapping set for an endpoint
    pub async fn replace_mappings(
        &self,
        endpoint_id: Uuid,
        mappings: Vec<mapping::ActiveModel>,
    ) -> Result<Vec<mapping::Model>, DbErr> {
        Mapping::delete_many()
            .filter(mapping::Column::EndpointId.eq(endpoint_id))
            .exec(&*self.db)
            .await?;

        for model in mappings {
            model.insert(&*self.db).await?;
        }

        self.mappings_for_endpoint(endpoint_id).await
    }
}
