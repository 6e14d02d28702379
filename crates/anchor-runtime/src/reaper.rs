//! Background retention reaper.
//!
//! Reads already treat expired entries as missing. The reaper bounds storage
//! by turning expired entries into tombstones and dropping tombstones once
//! their grace period has passed. Each pass over an agent runs in the agent's
//! exclusive section, so it never interleaves with a write or a restore.

use std::time::Duration;

use anchor_audit::{AuditOperation, AuditOutcome, AuditRecord};
use anchor_core::AgentId;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::store::GovernedStore;

/// Shortest sweep interval the reaper accepts.
const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Reaper settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Whether [`RetentionReaper::run`] sweeps at all.
    pub enabled: bool,
    /// Time between sweeps.
    pub interval: Duration,
    /// How long a tombstone is kept before it is purged.
    pub tombstone_grace: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            tombstone_grace: Duration::from_secs(86_400),
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperReport {
    /// Agents examined.
    pub agents: u64,
    /// Expired entries turned into tombstones.
    pub tombstoned: u64,
    /// Tombstones removed.
    pub purged: u64,
    /// Agents skipped because their section was busy.
    pub skipped: u64,
}

impl ReaperReport {
    /// Whether the sweep changed any data.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.tombstoned > 0 || self.purged > 0
    }
}

/// Periodic expiry and tombstone purge for a [`GovernedStore`].
#[derive(Debug)]
pub struct RetentionReaper {
    store: GovernedStore,
    config: ReaperConfig,
    cancel: CancellationToken,
}

impl RetentionReaper {
    /// Create a reaper for `store`.
    #[must_use]
    pub fn new(store: GovernedStore, config: ReaperConfig) -> Self {
        Self {
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops [`RetentionReaper::run`] when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Sweep every known agent once.
    ///
    /// Agents whose section cannot be entered in time are skipped and
    /// picked up by the next sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if an audit append fails. The agent being swept is
    /// left unchanged in that case.
    pub async fn sweep_once(&self) -> RuntimeResult<ReaperReport> {
        let mut report = ReaperReport::default();
        for agent_id in self.store.agents() {
            report.agents = report.agents.saturating_add(1);
            match self.sweep_agent(&agent_id).await {
                Ok((tombstoned, purged)) => {
                    report.tombstoned = report.tombstoned.saturating_add(tombstoned);
                    report.purged = report.purged.saturating_add(purged);
                },
                Err(RuntimeError::ConcurrencyTimeout { .. }) => {
                    report.skipped = report.skipped.saturating_add(1);
                },
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    async fn sweep_agent(&self, agent_id: &AgentId) -> RuntimeResult<(u64, u64)> {
        let inner = &self.store.inner;
        let mut state = inner.domains.write(agent_id).await?;
        let now = inner.clock.now();
        let grace = chrono::Duration::from_std(self.config.tombstone_grace)
            .unwrap_or(chrono::Duration::MAX);

        let mut expired = Vec::new();
        let mut purgeable = Vec::new();
        for (key, entry) in &state.entries {
            match entry.deleted_at {
                Some(deleted_at) if deleted_at.plus(grace).has_passed(now) => {
                    purgeable.push(key.clone());
                },
                None if entry.is_expired(now) => expired.push(key.clone()),
                _ => {},
            }
        }
        if expired.is_empty() && purgeable.is_empty() {
            return Ok((0, 0));
        }

        let tombstoned = u64::try_from(expired.len()).unwrap_or(u64::MAX);
        let purged = u64::try_from(purgeable.len()).unwrap_or(u64::MAX);
        let record = AuditRecord::new(AuditOperation::RetentionPurge, "*", AuditOutcome::Success)
            .meta("tombstoned", tombstoned)
            .meta("purged", purged)
            .meta("tombstoned_keys", expired.clone())
            .meta("purged_keys", purgeable.clone())
            .at(now);
        inner.audit.append(agent_id, record)?;

        state.retire(&expired, &purgeable, now);
        debug!(agent_id = %agent_id, tombstoned, purged, "Retention pass applied");
        Ok((tombstoned, purged))
    }

    /// Sweep on every tick until cancelled.
    pub async fn run(self) {
        if !self.config.enabled {
            info!("Retention reaper disabled");
            return;
        }

        let mut ticker = tokio::time::interval(self.config.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = u64::try_from(self.config.interval.as_millis()).unwrap_or(u64::MAX),
            "Retention reaper started"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    info!("Retention reaper stopped");
                    break;
                }

                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.changed() => info!(
                            agents = report.agents,
                            tombstoned = report.tombstoned,
                            purged = report.purged,
                            "Retention sweep finished"
                        ),
                        Ok(report) => debug!(agents = report.agents, "Retention sweep found nothing"),
                        Err(e) => warn!(error = %e, "Retention sweep failed"),
                    }
                }
            }
        }
    }

    /// Run on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use anchor_audit::AuditLog;
    use anchor_core::{Clock, ManualClock};
    use anchor_policy::{PolicyConfig, PolicyRegistry};
    use chrono::{TimeZone, Utc};
    use serde_json::{Map, json};

    struct Fixture {
        store: GovernedStore,
        clock: ManualClock,
        agent: AgentId,
    }

    async fn fixture() -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let registry = Arc::new(PolicyRegistry::new(Arc::clone(&shared)));
        let agent = AgentId::new("agent_1").unwrap();
        registry
            .update(
                &agent,
                PolicyConfig {
                    retention_by_prefix: [("temp:".to_owned(), 1)].into(),
                    ..PolicyConfig::default()
                },
            )
            .unwrap();
        let audit = Arc::new(AuditLog::in_memory(Arc::clone(&shared)));
        let store = GovernedStore::builder(registry, audit).clock(shared).build();
        for key in ["temp:a", "keep"] {
            store.write(&agent, key, json!(key), Map::new()).await.unwrap();
        }
        Fixture { store, clock, agent }
    }

    fn reaper(store: &GovernedStore) -> RetentionReaper {
        RetentionReaper::new(
            store.clone(),
            ReaperConfig {
                enabled: true,
                interval: Duration::from_millis(50),
                tombstone_grace: Duration::from_secs(3600),
            },
        )
    }

    #[tokio::test]
    async fn test_nothing_expired_is_not_audited() {
        let f = fixture().await;
        let report = reaper(&f.store).sweep_once().await.unwrap();
        assert!(!report.changed());
        assert_eq!(report.agents, 1);
        assert_eq!(f.store.audit().event_count(&f.agent).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_expired_then_purged_after_grace() {
        let f = fixture().await;
        let reaper = reaper(&f.store);

        f.clock.advance(chrono::Duration::days(1));
        let report = reaper.sweep_once().await.unwrap();
        assert_eq!((report.tombstoned, report.purged), (1, 0));
        {
            let state = f.store.inner.domains.read(&f.agent).await.unwrap();
            assert!(state.entries["temp:a"].is_tombstone());
        }

        f.clock.advance(chrono::Duration::minutes(30));
        assert!(!reaper.sweep_once().await.unwrap().changed());

        f.clock.advance(chrono::Duration::minutes(30));
        let report = reaper.sweep_once().await.unwrap();
        assert_eq!((report.tombstoned, report.purged), (0, 1));
        {
            let state = f.store.inner.domains.read(&f.agent).await.unwrap();
            assert!(!state.entries.contains_key("temp:a"));
        }
        assert_eq!(f.store.list(&f.agent, None).await.unwrap(), ["keep"]);

        let events = f.store.audit().events(&f.agent).unwrap();
        let purges: Vec<_> = events
            .iter()
            .filter(|e| e.operation == AuditOperation::RetentionPurge)
            .collect();
        assert_eq!(purges.len(), 2);
        assert_eq!(purges[0].metadata["tombstoned_keys"], json!(["temp:a"]));
        assert!(f.store.audit().verify(&f.agent).unwrap().valid);
    }

    #[tokio::test]
    async fn test_deleted_entries_purged_after_grace() {
        let f = fixture().await;
        f.store.delete(&f.agent, "keep").await.unwrap();
        f.clock.advance(chrono::Duration::hours(1));
        let report = reaper(&f.store).sweep_once().await.unwrap();
        assert_eq!(report.purged, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let f = fixture().await;
        let reaper = reaper(&f.store);
        let token = reaper.cancellation_token();
        let handle = reaper.spawn();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_disabled_reaper_returns_immediately() {
        let f = fixture().await;
        let reaper = RetentionReaper::new(
            f.store.clone(),
            ReaperConfig {
                enabled: false,
                ..ReaperConfig::default()
            },
        );
        tokio::time::timeout(Duration::from_secs(1), reaper.run())
            .await
            .unwrap();
    }
}
