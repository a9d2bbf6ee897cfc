//! Cooperative source poller
//!
//! Periodically sweeps for due sources and fans their sync passes out under
//! a concurrency cap. A manual trigger channel lets the HTTP surface start
//! a pass immediately; per-source single-flight locks guarantee that no two
//! passes for the same source ever overlap, however they were started. A
//! trigger that finds a pass already in flight is coalesced and dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PollerConfig;
use crate::ingest::SyncOrchestrator;
use crate::repositories::SourceRepository;

/// Counters for one sweep, surfaced in logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub due: usize,
    pub launched: usize,
    pub skipped_in_flight: usize,
}

/// Background poller driving scheduled and manually triggered sync passes.
pub struct Poller {
    orchestrator: SyncOrchestrator,
    sources: SourceRepository,
    config: PollerConfig,
    permits: Arc<Semaphore>,
    locks: SourceLocks,
}

impl Poller {
    pub fn new(
        orchestrator: SyncOrchestrator,
        sources: SourceRepository,
        config: PollerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.concurrency as usize));
        Self {
            orchestrator,
            sources,
            config,
            permits,
            locks: SourceLocks::default(),
        }
    }

    /// Run the poller until the shutdown token fires.
    ///
    /// Sweeps happen every tick; manual triggers are served between ticks.
    /// Passes run as detached tasks so a slow upstream never delays the
    /// loop itself.
    pub async fn run(
        self: Arc<Self>,
        mut triggers: mpsc::Receiver<Uuid>,
        shutdown: CancellationToken,
    ) {
        info!(
            tick_interval_seconds = self.config.tick_interval_seconds,
            concurrency = self.config.concurrency,
            "Poller started"
        );
        let tick = Duration::from_secs(self.config.tick_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Poller shutting down");
                    break;
                }
                _ = tokio::time::sleep(tick) => {
                    match self.sweep().await {
                        Ok(stats) if stats.due > 0 => {
                            debug!(
                                due = stats.due,
                                launched = stats.launched,
                                skipped_in_flight = stats.skipped_in_flight,
                                "Sweep complete"
                            );
                        }
                        Ok(_) => {}
                        Err(err) => {
                            error!(error = %err, "Sweep failed to list due sources");
                        }
                    }
                }
                Some(source_id) = triggers.recv() => {
                    self.trigger(source_id).await;
                }
            }
        }
    }

    /// One sweep: launch a pass for every due source not already running.
    async fn sweep(&self) -> Result<SweepStats, sea_orm::DbErr> {
        let due = self.sources.list_due(Utc::now()).await?;
        let mut stats = SweepStats {
            due: due.len(),
            ..Default::default()
        };

        for source in due {
            if self.launch(source) {
                stats.launched += 1;
            } else {
                stats.skipped_in_flight += 1;
            }
        }

        counter!("ingest_poller_sweeps_total").increment(1);
        Ok(stats)
    }

    /// Serve one manual trigger from the sync-now endpoint.
    async fn trigger(&self, source_id: Uuid) {
        counter!("ingest_manual_triggers_total").increment(1);

        let source = match self.sources.get(source_id).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                warn!(source_id = %source_id, "Manual trigger for unknown source");
                return;
            }
            Err(err) => {
                error!(source_id = %source_id, error = %err, "Manual trigger lookup failed");
                return;
            }
        };

        if !source.active {
            warn!(source_id = %source_id, "Manual trigger for inactive source, ignoring");
            return;
        }

        if !self.launch(source) {
            // Coalesced: the in-flight pass will pick up the same data.
            info!(source_id = %source_id, "Pass already in flight, trigger coalesced");
            counter!("ingest_manual_triggers_coalesced_total").increment(1);
        }
    }

    /// Start a detached pass for a source; false when one is in flight.
    ///
    /// The pass waits for a concurrency permit inside its own task, so an
    /// exhausted budget never stalls the sweep or trigger loop.
    fn launch(&self, source: crate::models::source::Model) -> bool {
        let source_id = source.id;
        let lock = self.locks.lock_for(source_id);
        let Ok(guard) = lock.clone().try_lock_owned() else {
            return false;
        };

        let permits = self.permits.clone();
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                // Semaphore closes only at shutdown
                return;
            };

            gauge!("ingest_passes_in_flight").increment(1.0);
            if let Err(err) = orchestrator.sync_source(source).await {
                debug!(source_id = %source_id, error = %err, "Pass ended with error");
            }
            gauge!("ingest_passes_in_flight").decrement(1.0);
            drop(guard);
        });
        true
    }
}

/// Per-source single-flight locks.
///
/// The map only ever grows; entries are tiny and sources number in the
/// hundreds at most.
#[derive(Debug, Clone, Default)]
struct SourceLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SourceLocks {
    fn lock_for(&self, source_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = match self.inner.lock() {
            Ok(map) => map,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry(source_id).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source;
    use chrono::Utc;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    #[test]
    fn same_source_shares_one_lock() {
        let locks = SourceLocks::default();
        let id = Uuid::new_v4();

        let first = locks.lock_for(id);
        let second = locks.lock_for(id);
        assert!(Arc::ptr_eq(&first, &second));

        let other = locks.lock_for(Uuid::new_v4());
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[tokio::test]
    async fn second_acquisition_is_rejected_while_held() {
        let locks = SourceLocks::default();
        let id = Uuid::new_v4();

        let lock = locks.lock_for(id);
        let guard = lock.clone().try_lock_owned().unwrap();

        // A concurrent trigger must coalesce, not queue
        assert!(locks.lock_for(id).try_lock_owned().is_err());

        drop(guard);
        assert!(locks.lock_for(id).try_lock_owned().is_ok());
    }

    fn sample_source() -> source::Model {
        source::Model {
            id: Uuid::new_v4(),
            name: "s".to_string(),
            base_url: "http://127.0.0.1:9/".to_string(),
            auth_mode: "none".to_string(),
            auth_endpoint: None,
            auth_payload: None,
            access_token: None,
            refresh_token: None,
            poll_interval_seconds: 900,
            active: true,
            last_synced_at: None,
            last_success_at: None,
            last_error: None,
            next_sync_at: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn launch_returns_before_a_permit_is_free() {
        let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
        Migrator::up(db.as_ref(), None).await.unwrap();

        let config = PollerConfig {
            concurrency: 1,
            ..PollerConfig::default()
        };
        let poller = Poller::new(
            SyncOrchestrator::new(reqwest::Client::new(), db.clone(), config.clone()),
            SourceRepository::new(db),
            config,
        );

        // Exhaust the budget; launching must still return immediately with
        // the pass parked on the permit, not the caller.
        let held = poller.permits.clone().try_acquire_owned().unwrap();

        let source = sample_source();
        assert!(poller.launch(source.clone()));
        // The parked pass already owns the single-flight slot
        assert!(!poller.launch(source));

        drop(held);
    }
}
