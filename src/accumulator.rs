//! Process-local running total.
//!
//! This module provides [`LocalAccumulator`], the in-memory half of a
//! [`SharedCounter`](crate::counter::SharedCounter). It absorbs increments
//! with a single atomic read-modify-write and never performs I/O.
//!
//! # Why not sharded?
//!
//! Reconciliation needs the exact total *before* an addition (the
//! pre-fold total of the merge algorithm), which a sharded counter cannot
//! report without summing every slot. A single cache-line padded atomic gives
//! that value for free and still keeps neighbouring data off its cache line.

use crossbeam_utils::CachePadded;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotone, lock-free running total owned by one process instance.
///
/// The total includes every increment absorbed locally plus every remote
/// delta folded in by reconciliation. It never decreases.
///
/// # Examples
///
/// ```rust
/// use condiviso::accumulator::LocalAccumulator;
///
/// let acc = LocalAccumulator::new();
/// assert_eq!(acc.increment(5), 0);
/// assert_eq!(acc.increment(3), 5);
/// assert_eq!(acc.total(), 8);
/// ```
///
/// Multi-threaded usage:
///
/// ```rust
/// use condiviso::accumulator::LocalAccumulator;
/// use std::sync::Arc;
/// use std::thread;
///
/// let acc = Arc::new(LocalAccumulator::new());
/// let mut handles = vec![];
///
/// for _ in 0..4 {
///     let a = Arc::clone(&acc);
///     handles.push(thread::spawn(move || {
///         for _ in 0..1000 {
///             a.increment(1);
///         }
///     }));
/// }
///
/// for h in handles {
///     h.join().unwrap();
/// }
///
/// assert_eq!(acc.total(), 4000);
/// ```
pub struct LocalAccumulator {
    total: CachePadded<AtomicU64>,
}

impl LocalAccumulator {
    /// Creates an accumulator starting at zero.
    pub const fn new() -> Self {
        LocalAccumulator {
            total: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Adds `n` to the total and returns the total *before* the addition.
    ///
    /// The total saturates at `u64::MAX`.
    #[inline]
    pub fn increment(&self, n: u64) -> u64 {
        match self
            .total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                Some(t.saturating_add(n))
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }

    /// Returns the current total.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }
}

impl Default for LocalAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for LocalAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LocalAccumulator{{ {} }}", self.total())
    }
}
