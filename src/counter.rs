//! The shared counter exposed to callers.
//!
//! [`SharedCounter`] joins a [`LocalAccumulator`] and a [`Reconciler`] behind
//! a refresh gate. Every [`add`](SharedCounter::add) and
//! [`get`](SharedCounter::get) first asks whether more than the refresh
//! interval has elapsed since the last reconciliation attempt; if so, it
//! reconciles inline before answering, otherwise it answers from local state
//! alone.
//!
//! ```text
//!   add(n) / get()
//!        │
//!        ▼
//!   elapsed > interval? ──no──► answer from accumulator
//!        │ yes
//!        ▼
//!   try_lock reconciler ──busy──► answer from accumulator
//!        │ acquired
//!        ▼
//!   last_sync_at = now, reconcile (errors logged)
//!        │
//!        ▼
//!   answer from accumulator
//! ```
//!
//! The frequency of store round-trips is therefore bounded by the interval,
//! whatever the request rate. Reconciliation errors never reach `add`/`get`:
//! local absorption always succeeds, only publication is delayed.
//!
//! # Examples
//!
//! ```rust
//! use condiviso::config::CounterConfig;
//! use condiviso::counter::SharedCounter;
//! use condiviso::store::{MemoryStore, SharedStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.set("clicks", 100).unwrap();
//!
//! let counter = SharedCounter::new(
//!     Arc::clone(&store),
//!     CounterConfig::new().with_key("clicks"),
//! );
//!
//! assert_eq!(counter.add(5), 5);
//! counter.sync_now().unwrap();
//! assert_eq!(counter.get(), 105);
//! assert_eq!(store.get("clicks").unwrap(), Some(105));
//! ```

use crate::accumulator::LocalAccumulator;
use crate::config::CounterConfig;
use crate::reconciler::{Reconciler, SyncReport};
use crate::stats::{StatsSnapshot, SyncStats};
use crate::store::{Result, SharedStore};
use atomic_time::AtomicOptionInstant;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A counter whose total is shared by every instance using the same key.
///
/// `SharedCounter` is `Send + Sync` when its store is; share it across
/// request handlers with `Arc`.
pub struct SharedCounter<S> {
    accumulator: LocalAccumulator,
    reconciler: Mutex<Reconciler<S>>,
    last_sync_at: AtomicOptionInstant,
    refresh_interval: Duration,
    stats: Arc<SyncStats>,
    key: String,
}

impl<S: SharedStore> SharedCounter<S> {
    /// Creates a counter reconciling into `store` as `config` describes.
    ///
    /// No I/O happens here; the first reconciliation is due one refresh
    /// interval after construction, or on [`sync_now`](Self::sync_now).
    pub fn new(store: S, config: CounterConfig) -> Self {
        let stats = Arc::new(SyncStats::new());
        let reconciler = Reconciler::new(store, config.key.clone())
            .with_max_retries(config.max_retries)
            .with_stats(Arc::clone(&stats));
        let last_sync_at = AtomicOptionInstant::none();
        last_sync_at.store(Some(Instant::now()), Ordering::Release);
        Self {
            accumulator: LocalAccumulator::new(),
            reconciler: Mutex::new(reconciler),
            last_sync_at,
            refresh_interval: config.refresh_interval,
            stats,
            key: config.key,
        }
    }

    /// Absorbs `n` and returns the new total, `n` included.
    ///
    /// Reconciles first if the refresh interval has elapsed.
    pub fn add(&self, n: u64) -> u64 {
        self.maybe_reconcile();
        self.accumulator.increment(n).saturating_add(n)
    }

    /// Returns the best-known total.
    ///
    /// Reconciles first if the refresh interval has elapsed.
    pub fn get(&self) -> u64 {
        self.maybe_reconcile();
        self.accumulator.total()
    }

    /// Reconciles now, ignoring the refresh interval.
    ///
    /// Waits for a reconciliation already running on another thread. Useful
    /// right after start-up, to pick up the shared total before serving, and
    /// before shutdown, to publish what was absorbed since the last cycle.
    pub fn sync_now(&self) -> Result<SyncReport> {
        let mut reconciler = self.reconciler.lock();
        self.last_sync_at
            .store(Some(Instant::now()), Ordering::Release);
        reconciler.reconcile(&self.accumulator)
    }

    /// Runs a reconciliation if one is due and no other caller is running
    /// one. Returns `true` if a reconciliation was attempted.
    pub fn maybe_reconcile(&self) -> bool {
        if !self.is_due(Instant::now()) {
            return false;
        }
        let Some(mut reconciler) = self.reconciler.try_lock() else {
            return false;
        };
        // Another caller may have finished a cycle between the check and
        // the lock.
        let now = Instant::now();
        if !self.is_due(now) {
            return false;
        }
        self.last_sync_at.store(Some(now), Ordering::Release);
        // Failures are logged and counted by the reconciler.
        let _ = reconciler.reconcile(&self.accumulator);
        true
    }

    /// Returns `true` if more than the refresh interval has elapsed since
    /// the last reconciliation attempt.
    fn is_due(&self, now: Instant) -> bool {
        match self.last_sync_at.load(Ordering::Acquire) {
            Some(last) => now.saturating_duration_since(last) > self.refresh_interval,
            None => true,
        }
    }

    /// The shared key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The refresh interval.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// The running total, without triggering a reconciliation.
    pub fn local_total(&self) -> u64 {
        self.accumulator.total()
    }

    /// The shared total as last published by this instance.
    ///
    /// Waits for a reconciliation in progress.
    pub fn last_known_remote_total(&self) -> u64 {
        self.reconciler.lock().last_known_remote_total()
    }

    /// Live reconciliation statistics.
    pub fn sync_stats(&self) -> &SyncStats {
        &self.stats
    }

    /// A snapshot of totals and statistics.
    pub fn stats(&self) -> StatsSnapshot {
        let last_known = self.last_known_remote_total();
        StatsSnapshot::capture(
            self.key.clone(),
            self.accumulator.total(),
            last_known,
            &self.stats,
        )
    }
}

impl<S> Debug for SharedCounter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedCounter")
            .field("key", &self.key)
            .field("local_total", &self.accumulator.total())
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}
