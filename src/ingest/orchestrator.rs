//! Source sync orchestration
//!
//! One pass over one source: fetch each active endpoint through the auth
//! session, run delta detection, split the payload into items per the
//! endpoint's response shape, map and resolve each item, and write the
//! bookkeeping back in a single success or failure update. Item-level
//! failures are logged and skipped; only source-level failures abort the
//! pass.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use reqwest::{Client, Method, Url};
use sea_orm::DatabaseConnection;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::error::IngestError;
use crate::ingest::auth::{AuthSession, RequestSpec, UpstreamResponse};
use crate::ingest::delta::{DeltaDetector, DeltaOutcome};
use crate::ingest::mapper::map_item;
use crate::ingest::resolver::{EntityResolver, TypeCache};
use crate::ingest::unwrap::unwrap_payload;
use crate::models::{endpoint, source};
use crate::repositories::outbox::EVENT_ASSET_STATE_TRANSITIONED;
use crate::repositories::{EntityRepository, OutboxRepository, SourceRepository};

/// Response shape markers stored on an endpoint row
pub const SHAPE_SINGLE: &str = "single";
pub const SHAPE_LIST: &str = "list";
pub const SHAPE_AUTO: &str = "auto";

/// Object members probed when the `auto` shape meets a JSON object
const AUTO_LIST_MEMBERS: &[&str] = &["data", "items", "results"];

/// Tally of one completed pass over one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub endpoints_synced: usize,
    pub endpoints_unchanged: usize,
    pub items_upserted: usize,
    pub items_skipped: usize,
    pub status_transitions: usize,
}

/// Drives full sync passes; shared between the poller and the sync-now
/// handler.
#[derive(Clone)]
pub struct SyncOrchestrator {
    http: Client,
    sources: SourceRepository,
    entities: EntityRepository,
    outbox: OutboxRepository,
    resolver: EntityResolver,
    delta: DeltaDetector,
    config: PollerConfig,
}

impl SyncOrchestrator {
    pub fn new(
        http: Client,
        db: Arc<DatabaseConnection>,
        config: PollerConfig,
    ) -> Self {
        let entities = EntityRepository::new(db.clone());
        Self {
            http,
            sources: SourceRepository::new(db.clone()),
            resolver: EntityResolver::new(entities.clone()),
            entities,
            outbox: OutboxRepository::new(db),
            delta: DeltaDetector,
            config,
        }
    }

    /// Run one full pass over a source and record the outcome.
    ///
    /// On success the source gets a cleared error and the next due time; on
    /// failure the error text and the same schedule. Either way exactly one
    /// source-level bookkeeping write happens; delta state lands on each
    /// endpoint as it is synced.
    pub async fn sync_source(&self, source: source::Model) -> Result<SyncOutcome, IngestError> {
        let started = std::time::Instant::now();
        let source_id = source.id;
        let now = Utc::now();
        let next_sync_at = now + ChronoDuration::seconds(self.poll_interval(&source));

        info!(source_id = %source_id, name = %source.name, "Starting sync pass");

        match self.run_pass(source).await {
            Ok(outcome) => {
                self.sources
                    .record_success(source_id, Utc::now(), next_sync_at)
                    .await?;

                histogram!("ingest_sync_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                counter!("ingest_sync_passes_total", "outcome" => "success").increment(1);
                info!(
                    source_id = %source_id,
                    endpoints = outcome.endpoints_synced,
                    items = outcome.items_upserted,
                    skipped = outcome.items_skipped,
                    "Sync pass complete"
                );
                Ok(outcome)
            }
            Err(error) => {
                counter!("ingest_sync_passes_total", "outcome" => "failure").increment(1);
                warn!(source_id = %source_id, error = %error, "Sync pass failed");
                self.sources
                    .record_failure(source_id, &error.to_string(), Utc::now(), next_sync_at)
                    .await?;
                Err(error)
            }
        }
    }

    /// Fetch one endpoint without processing the payload.
    ///
    /// Backs the preview operation: the caller mirrors the upstream status
    /// and body verbatim. No conditional-request header is attached so the
    /// preview always shows real data.
    pub async fn fetch_endpoint(
        &self,
        source: source::Model,
        endpoint: &endpoint::Model,
    ) -> Result<UpstreamResponse, IngestError> {
        let spec = build_request(&source, endpoint, None)?;
        let mut session = AuthSession::new(self.http.clone(), self.sources.clone(), source);
        session.fetch(&spec).await
    }

    async fn run_pass(&self, source: source::Model) -> Result<SyncOutcome, IngestError> {
        let endpoints = self.sources.active_endpoints(source.id).await?;
        if endpoints.is_empty() {
            debug!(source_id = %source.id, "Source has no active endpoints");
            return Ok(SyncOutcome::default());
        }

        let mut session =
            AuthSession::new(self.http.clone(), self.sources.clone(), source.clone());
        let mut cache = TypeCache::warm(&self.entities).await?;

        let mut outcome = SyncOutcome::default();

        for endpoint in endpoints {
            let endpoint_id = endpoint.id;
            let result = self
                .sync_endpoint(&mut session, &mut cache, &source, &endpoint, &mut outcome)
                .await;

            match result {
                Ok((hash, etag)) => {
                    self.sources
                        .record_endpoint_outcome(endpoint_id, None, hash, etag, Utc::now())
                        .await?;
                    outcome.endpoints_synced += 1;
                }
                Err(error) => {
                    self.sources
                        .record_endpoint_outcome(
                            endpoint_id,
                            Some(&error.to_string()),
                            None,
                            None,
                            Utc::now(),
                        )
                        .await?;
                    return Err(error);
                }
            }
        }

        Ok(outcome)
    }

    /// Sync one endpoint; returns the fresh delta state to persist on it.
    async fn sync_endpoint(
        &self,
        session: &mut AuthSession,
        cache: &mut TypeCache,
        source: &source::Model,
        endpoint: &endpoint::Model,
        outcome: &mut SyncOutcome,
    ) -> Result<(Option<String>, Option<String>), IngestError> {
        let spec = build_request(source, endpoint, endpoint.last_etag.as_deref())?;
        let response = session.fetch(&spec).await?;

        if !response.is_success() && !response.not_modified {
            return Err(IngestError::Transport(format!(
                "upstream answered {} for {}",
                response.status, endpoint.path
            )));
        }

        let delta = self.delta.classify(
            response.not_modified,
            &response.body,
            endpoint.last_content_hash.as_deref(),
        );
        let hash = delta.hash().map(|h| h.to_string());

        if !delta.is_changed() {
            debug!(
                source_id = %source.id,
                endpoint = %endpoint.path,
                not_modified = matches!(delta, DeltaOutcome::NotModified),
                "Payload unchanged, skipping"
            );
            counter!("ingest_payloads_total", "delta" => "unchanged").increment(1);
            outcome.endpoints_unchanged += 1;
            return Ok((hash, response.etag));
        }
        counter!("ingest_payloads_total", "delta" => "changed").increment(1);

        let body = unwrap_payload(&response.body);
        let payload: JsonValue = serde_json::from_slice(&body)
            .map_err(|e| IngestError::Parse(format!("{}: {}", endpoint.path, e)))?;
        let items = split_items(&endpoint.response_shape, payload)?;

        let mappings = self.sources.mappings_for_endpoint(endpoint.id).await?;
        if mappings.is_empty() {
            debug!(endpoint = %endpoint.path, "Endpoint has no mappings");
            return Ok((hash, response.etag));
        }

        for item in &items {
            match map_item(item, &mappings) {
                Ok(mapped) => match self.resolver.resolve(cache, &mapped).await {
                    Ok(transition) => {
                        outcome.items_upserted += 1;
                        if let Some(transition) = transition {
                            outcome.status_transitions += 1;
                            self.outbox
                                .append(
                                    EVENT_ASSET_STATE_TRANSITIONED,
                                    serde_json::json!({
                                        "asset_id": transition.asset_id,
                                        "from": transition.from,
                                        "to": transition.to,
                                        "source_id": source.id,
                                    }),
                                )
                                .await?;
                        }
                    }
                    Err(crate::error::ItemError::Db(db_err)) => {
                        return Err(IngestError::Db(db_err));
                    }
                    Err(item_err) => {
                        warn!(
                            source_id = %source.id,
                            endpoint = %endpoint.path,
                            error = %item_err,
                            "Skipping unprocessable item"
                        );
                        counter!("ingest_items_skipped_total").increment(1);
                        outcome.items_skipped += 1;
                    }
                },
                Err(item_err) => {
                    warn!(
                        source_id = %source.id,
                        endpoint = %endpoint.path,
                        error = %item_err,
                        "Skipping unmappable item"
                    );
                    counter!("ingest_items_skipped_total").increment(1);
                    outcome.items_skipped += 1;
                }
            }
        }

        Ok((hash, response.etag))
    }

    fn poll_interval(&self, source: &source::Model) -> i64 {
        if source.poll_interval_seconds > 0 {
            source.poll_interval_seconds
        } else {
            self.config.default_interval_seconds as i64
        }
    }
}

/// Methods an endpoint may be configured with. Shared with the admin
/// surface; `Method::from_str` alone is too permissive since any HTTP token
/// parses as an extension method.
pub const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

/// Assemble the outbound request for an endpoint.
///
/// A JSON `null` body template (the default for GETs) sends no body and no
/// content-type header at all.
fn build_request(
    source: &source::Model,
    endpoint: &endpoint::Model,
    if_none_match: Option<&str>,
) -> Result<RequestSpec, IngestError> {
    let base = Url::parse(&source.base_url)
        .map_err(|e| IngestError::Configuration(format!("invalid base URL: {}", e)))?;
    let url = base
        .join(&endpoint.path)
        .map_err(|e| IngestError::Configuration(format!("invalid endpoint path: {}", e)))?;
    if !ALLOWED_METHODS.contains(&endpoint.method.as_str()) {
        return Err(IngestError::Configuration(format!(
            "invalid method: {}",
            endpoint.method
        )));
    }
    let method: Method = endpoint
        .method
        .parse()
        .map_err(|_| IngestError::Configuration(format!("invalid method: {}", endpoint.method)))?;

    let body = match &endpoint.body_template {
        Some(template) if !template.is_null() => Some(
            serde_json::to_vec(template)
                .map_err(|e| IngestError::Configuration(format!("invalid body template: {}", e)))?,
        ),
        _ => None,
    };

    Ok(RequestSpec {
        method,
        url,
        body,
        if_none_match: if_none_match.map(|v| v.to_string()),
    })
}

/// Split a decoded payload into items per the endpoint's response shape.
fn split_items(shape: &str, payload: JsonValue) -> Result<Vec<JsonValue>, IngestError> {
    match shape {
        SHAPE_SINGLE => Ok(vec![payload]),
        SHAPE_LIST => match payload {
            JsonValue::Array(items) => Ok(items),
            other => Err(IngestError::Parse(format!(
                "expected a JSON array for list-shaped endpoint, got {}",
                json_kind(&other)
            ))),
        },
        SHAPE_AUTO => Ok(auto_split(payload)),
        other => Err(IngestError::Configuration(format!(
            "unknown response shape: {}",
            other
        ))),
    }
}

/// Auto detection: a top-level array is the item list; an object exposing a
/// conventional list member (`data`, `items`, `results`) contributes that
/// member; anything else is a single item.
fn auto_split(payload: JsonValue) -> Vec<JsonValue> {
    match payload {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => {
            for member in AUTO_LIST_MEMBERS {
                if matches!(map.get(*member), Some(JsonValue::Array(_)))
                    && let Some(JsonValue::Array(items)) = map.remove(*member)
                {
                    return items;
                }
            }
            vec![JsonValue::Object(map)]
        }
        other => vec![other],
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
