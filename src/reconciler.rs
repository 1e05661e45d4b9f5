//! Merge of local increments into the shared total.
//!
//! This module holds the algorithm that makes many independent instances
//! converge on one total without ever overwriting each other's increments.
//!
//! # The Merge
//!
//! Each instance remembers `last_known_remote_total`, the shared total as it
//! last observed and published it. Everything its accumulator holds above
//! that value is its own, not yet published, contribution. Given a fresh
//! read of the shared total:
//!
//! ```text
//!   remote_total       = max(read, last_known_remote_total)      (rewind clamp)
//!   remote_delta       = remote_total - last_known_remote_total  (others' work)
//!   local_contribution = local_total  - last_known_remote_total  (our work)
//!   new_remote_total   = remote_total + local_contribution
//! ```
//!
//! Each instance only ever adds its own delta on top of what it read, so the
//! order in which instances commit does not matter.
//!
//! # Optimistic Publication
//!
//! The read and the write happen inside one watched transaction: if another
//! writer touches the key in between, the commit is refused and nothing local
//! is mutated. Only a confirmed commit folds `remote_delta` into the
//! accumulator and advances `last_known_remote_total`, so an aborted attempt
//! can neither lose local increments nor count remote ones twice.
//!
//! ```text
//!   Store: 100                 Instance A (local 5, known 0)
//!     │                          │
//!     │◄──── WATCH / GET ────────┤  remote_total = 100
//!     │                          │  remote_delta = 100, contribution = 5
//!     │◄──── SET 105 / EXEC ─────┤
//!     │                          │  fold +100 → local 105, known 105
//!   Store: 105
//! ```

use crate::accumulator::LocalAccumulator;
use crate::stats::SyncStats;
use crate::store::{Result, SharedStore, StoreError, StoreTransaction};
use std::sync::Arc;

/// The arithmetic of one reconciliation, computed from three numbers.
///
/// # Examples
///
/// ```rust
/// use condiviso::reconciler::Merge;
///
/// // Instance absorbed 5 locally, store holds 100, nothing published yet.
/// let merge = Merge::compute(100, 0, 5);
/// assert_eq!(merge.remote_delta, 100);
/// assert_eq!(merge.local_contribution, 5);
/// assert_eq!(merge.new_remote_total, 105);
///
/// // A stale read below what we already published is clamped.
/// let merge = Merge::compute(90, 105, 105);
/// assert!(merge.rewound);
/// assert_eq!(merge.remote_total, 105);
/// assert_eq!(merge.remote_delta, 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merge {
    /// The shared total used for the merge, after the rewind clamp.
    pub remote_total: u64,
    /// Growth of the shared total attributable to other instances.
    pub remote_delta: u64,
    /// The local total before the remote delta is folded in.
    pub pre_fold_total: u64,
    /// This instance's increments not yet reflected in the shared total.
    pub local_contribution: u64,
    /// The value to publish.
    pub new_remote_total: u64,
    /// `true` if the read was below `last_known_remote_total` and got clamped.
    pub rewound: bool,
}

impl Merge {
    /// Computes the merge of a fresh `remote_read` with the local state.
    pub fn compute(remote_read: u64, last_known_remote_total: u64, local_total: u64) -> Self {
        let rewound = remote_read < last_known_remote_total;
        let remote_total = remote_read.max(last_known_remote_total);
        let remote_delta = remote_total - last_known_remote_total;
        let local_contribution = local_total.saturating_sub(last_known_remote_total);
        Self {
            remote_total,
            remote_delta,
            pre_fold_total: local_total,
            local_contribution,
            new_remote_total: remote_total.saturating_add(local_contribution),
            rewound,
        }
    }
}

/// The outcome of a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// The merge that was committed.
    pub merge: Merge,
    /// Transactions run, `1` unless conflicts were retried.
    pub attempts: u32,
}

/// Publishes one instance's contribution to a shared key.
///
/// The reconciler owns the store handle (injected at construction) and the
/// `last_known_remote_total` bookkeeping. It is not internally synchronized:
/// [`SharedCounter`](crate::counter::SharedCounter) keeps it behind a mutex.
#[derive(Debug)]
pub struct Reconciler<S> {
    store: S,
    key: String,
    last_known_remote_total: u64,
    max_retries: u32,
    stats: Arc<SyncStats>,
}

impl<S: SharedStore> Reconciler<S> {
    /// Creates a reconciler publishing to `key` on `store`.
    pub fn new(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            last_known_remote_total: 0,
            max_retries: 0,
            stats: Arc::new(SyncStats::new()),
        }
    }

    /// Sets how many extra transactions to run after a conflict.
    ///
    /// The default, `0`, gives up at the first conflict and leaves the
    /// contribution for the next reconciliation.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Shares `stats` with the caller instead of a private instance.
    pub fn with_stats(mut self, stats: Arc<SyncStats>) -> Self {
        self.stats = stats;
        self
    }

    /// The shared key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The shared total as last published by this instance.
    pub fn last_known_remote_total(&self) -> u64 {
        self.last_known_remote_total
    }

    /// The injected store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Statistics updated by this reconciler.
    pub fn stats(&self) -> &Arc<SyncStats> {
        &self.stats
    }

    /// Merges the unpublished part of `accumulator` into the shared total.
    ///
    /// On success the remote delta has been folded into `accumulator` and
    /// `last_known_remote_total` equals the published value. On error the
    /// local state is exactly as before the call.
    pub fn reconcile(&mut self, accumulator: &LocalAccumulator) -> Result<SyncReport> {
        self.stats.record_attempt();
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.publish_once(accumulator) {
                Ok(merge) => {
                    self.stats.record_commit();
                    tracing::debug!(
                        key = %self.key,
                        remote_delta = merge.remote_delta,
                        local_contribution = merge.local_contribution,
                        total = merge.new_remote_total,
                        attempts,
                        "reconciled shared counter"
                    );
                    return Ok(SyncReport { merge, attempts });
                }
                Err(StoreError::Conflict(key)) => {
                    self.stats.record_conflict();
                    if attempts > self.max_retries {
                        tracing::warn!(
                            %key,
                            local_total = accumulator.total(),
                            attempts,
                            "failed to reconcile: concurrent modification"
                        );
                        self.stats.record_failure();
                        return Err(StoreError::Conflict(key));
                    }
                    self.stats.record_retry();
                }
                Err(e) => {
                    tracing::warn!(
                        key = %self.key,
                        local_total = accumulator.total(),
                        error = %e,
                        "failed to reconcile"
                    );
                    self.stats.record_failure();
                    return Err(e);
                }
            }
        }
    }

    fn publish_once(&mut self, accumulator: &LocalAccumulator) -> Result<Merge> {
        let mut txn = self.store.watch(&self.key)?;
        let remote_read = txn.get()?.unwrap_or(self.last_known_remote_total);

        let merge = Merge::compute(
            remote_read,
            self.last_known_remote_total,
            accumulator.total(),
        );
        if merge.rewound {
            self.stats.record_rewind();
            tracing::warn!(
                key = %self.key,
                read = remote_read,
                last_known = self.last_known_remote_total,
                "shared total went backwards, keeping last known value"
            );
        }

        txn.commit(merge.new_remote_total)?;

        // Increments absorbed since `pre_fold_total` was read stay above
        // the new `last_known_remote_total` and are published next time.
        accumulator.increment(merge.remote_delta);
        self.last_known_remote_total = merge.new_remote_total;
        Ok(merge)
    }
}
