//! Retention Sweeper
//!
//! Reclaims sessions and their documents. Three reasons a session goes away:
//!
//! - it outlived `session_ttl` (any status)
//! - it was downloaded and the grace window has passed
//! - it is pre-staged or failed and outlived the shorter `prestage_ttl`
//!
//! Decisions are made against the injected clock. The spawned tasks only pace
//! the passes, so tests call [`RetentionSweeper::sweep_once`] directly after
//! advancing a [`crate::clock::ManualClock`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::session::{SessionKind, SessionRegistry};
use crate::store::DocumentStore;

/// Retention thresholds
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub session_ttl: Duration,
    pub prestage_ttl: Duration,
    pub grace_window: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(3600),
            prestage_ttl: Duration::from_secs(1800),
            grace_window: Duration::from_secs(10),
        }
    }
}

/// Result of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions removed from the registry
    pub removed: usize,
    /// Sessions whose documents could not be deleted
    pub storage_failures: usize,
}

pub struct RetentionSweeper {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    policy: RetentionPolicy,
}

impl RetentionSweeper {
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            policy,
        }
    }

    /// Main pass: stale sessions of any status plus consumed ones
    pub async fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now_ms();
        let mut ids: BTreeSet<String> = self
            .registry
            .expire(now, self.policy.session_ttl)
            .into_iter()
            .collect();
        ids.extend(self.registry.consumed(now, self.policy.grace_window));

        let report = self.remove_all(ids, "expired").await;
        if report.removed > 0 {
            info!(removed = report.removed, "Retention sweep completed");
        }
        report
    }

    /// Shorter pass: pre-staged and failed sessions past `prestage_ttl`
    pub async fn sweep_prestaged(&self) -> SweepReport {
        let now = self.clock.now_ms();
        let ttl = self.policy.prestage_ttl;
        let mut ids: BTreeSet<String> = self
            .registry
            .expire_kind(now, ttl, SessionKind::Prestaged)
            .into_iter()
            .collect();
        ids.extend(self.registry.expire_failed(now, ttl));

        let report = self.remove_all(ids, "abandoned").await;
        if report.removed > 0 {
            info!(removed = report.removed, "Pre-stage sweep completed");
        }
        report
    }

    /// Remove downloaded sessions whose grace window has passed
    pub async fn reap_consumed(&self) -> SweepReport {
        let now = self.clock.now_ms();
        let ids = self.registry.consumed(now, self.policy.grace_window);
        self.remove_all(ids, "downloaded").await
    }

    async fn remove_all(&self, ids: impl IntoIterator<Item = String>, reason: &str) -> SweepReport {
        let mut report = SweepReport::default();
        for id in ids {
            // Registry first so nothing new is served for this id
            if !self.registry.remove(&id) {
                continue;
            }
            report.removed += 1;
            if let Err(e) = self.store.remove(&id).await {
                report.storage_failures += 1;
                error!(session_id = %id, error = %e, "Failed to delete session documents");
                continue;
            }
            debug!(session_id = %id, reason, "Session removed");
        }
        report
    }

    /// Reap this download once its grace window has run out
    pub fn schedule_grace_reap(self: &Arc<Self>) {
        let sweeper = Arc::clone(self);
        let delay = self.policy.grace_window + Duration::from_millis(50);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let report = sweeper.reap_consumed().await;
            if report.removed > 0 {
                debug!(removed = report.removed, "Grace window reap completed");
            }
        });
    }
}

/// Spawn the periodic sweep tasks
pub fn spawn_sweeper_tasks(
    sweeper: Arc<RetentionSweeper>,
    sweep_interval: Duration,
    prestage_interval: Duration,
) {
    let main = Arc::clone(&sweeper);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(sweep_interval).await;
            let report = main.sweep_once().await;
            debug!(
                removed = report.removed,
                storage_failures = report.storage_failures,
                active = main.registry.len(),
                "Retention pass finished"
            );
        }
    });

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(prestage_interval).await;
            let report = sweeper.sweep_prestaged().await;
            debug!(
                removed = report.removed,
                storage_failures = report.storage_failures,
                "Pre-stage pass finished"
            );
        }
    });

    info!(
        sweep_interval_secs = sweep_interval.as_secs(),
        prestage_interval_secs = prestage_interval.as_secs(),
        "Retention sweeper started"
    );
}
