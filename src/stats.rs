//! Reconciliation statistics.
//!
//! Every [`SharedCounter`](crate::counter::SharedCounter) carries a
//! [`SyncStats`] updated by its reconciler. Reads are relaxed: the numbers
//! are diagnostics, not synchronization points.
//!
//! A [`StatsSnapshot`] freezes the statistics together with the counter's
//! totals. With the `serde` feature it can be serialized with any serde
//! format:
//!
//! ```rust,ignore
//! let snapshot = counter.stats();
//! let json = serde_json::to_string(&snapshot)?;
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live reconciliation counters.
#[derive(Debug, Default)]
pub struct SyncStats {
    attempts: AtomicU64,
    commits: AtomicU64,
    conflicts: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
    rewinds: AtomicU64,
}

impl SyncStats {
    /// Creates zeroed statistics.
    pub const fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rewinds: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_rewind(&self) {
        self.rewinds.fetch_add(1, Ordering::Relaxed);
    }

    /// Reconciliations started, whatever their outcome.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Transactions committed.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    /// Transactions aborted because another writer won.
    pub fn conflicts(&self) -> u64 {
        self.conflicts.load(Ordering::Relaxed)
    }

    /// Extra transactions run after a conflict.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Reconciliations that ended without publishing.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Remote reads found below the last known remote total.
    pub fn rewinds(&self) -> u64 {
        self.rewinds.load(Ordering::Relaxed)
    }
}

/// A point-in-time view of a counter and its reconciliation history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatsSnapshot {
    /// The shared key the counter reconciles into.
    pub key: String,
    /// The instance's running total.
    pub local_total: u64,
    /// The shared total as last published by this instance.
    pub last_known_remote_total: u64,
    /// See [`SyncStats::attempts`].
    pub attempts: u64,
    /// See [`SyncStats::commits`].
    pub commits: u64,
    /// See [`SyncStats::conflicts`].
    pub conflicts: u64,
    /// See [`SyncStats::retries`].
    pub retries: u64,
    /// See [`SyncStats::failures`].
    pub failures: u64,
    /// See [`SyncStats::rewinds`].
    pub rewinds: u64,
}

impl StatsSnapshot {
    /// Captures `stats` along with the given totals.
    pub fn capture(
        key: impl Into<String>,
        local_total: u64,
        last_known_remote_total: u64,
        stats: &SyncStats,
    ) -> Self {
        Self {
            key: key.into(),
            local_total,
            last_known_remote_total,
            attempts: stats.attempts(),
            commits: stats.commits(),
            conflicts: stats.conflicts(),
            retries: stats.retries(),
            failures: stats.failures(),
            rewinds: stats.rewinds(),
        }
    }

    /// Increments absorbed locally but not yet published.
    pub fn unpublished(&self) -> u64 {
        self.local_total
            .saturating_sub(self.last_known_remote_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zero() {
        let stats = SyncStats::new();
        let snap = StatsSnapshot::capture("k", 0, 0, &stats);
        assert_eq!(
            snap,
            StatsSnapshot {
                key: "k".into(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_record() {
        let stats = SyncStats::new();
        stats.record_attempt();
        stats.record_attempt();
        stats.record_commit();
        stats.record_conflict();
        stats.record_retry();
        stats.record_failure();
        stats.record_rewind();

        let snap = StatsSnapshot::capture("k", 12, 10, &stats);
        assert_eq!(snap.attempts, 2);
        assert_eq!(snap.commits, 1);
        assert_eq!(snap.conflicts, 1);
        assert_eq!(snap.retries, 1);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.rewinds, 1);
        assert_eq!(snap.unpublished(), 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize() {
        let stats = SyncStats::new();
        stats.record_attempt();
        let snap = StatsSnapshot::capture("clicks", 5, 0, &stats);
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains(r#""key":"clicks""#));
        assert!(json.contains(r#""local_total":5"#));
        let back: StatsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
