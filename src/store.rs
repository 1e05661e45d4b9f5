//! Shared-store abstraction and adapters.
//!
//! A shared store is an opaque key-value service holding the shared total
//! of every counter instance. The reconciler only needs three things from
//! it:
//!
//! - a plain [`get`](SharedStore::get),
//! - a plain [`set`](SharedStore::set) (administrative; never used to publish),
//! - a [`watch`](SharedStore::watch)-guarded transaction whose
//!   [`commit`](StoreTransaction::commit) fails with
//!   [`StoreError::Conflict`] when another writer touched the key after the
//!   watch was taken.
//!
//! Totals are stored as decimal strings, which is what every Redis client in
//! every language reads and writes for `INCRBY`-style counters.
//!
//! # Available Adapters
//!
//! | Adapter | Feature | Description |
//! |---------|---------|-------------|
//! | [`MemoryStore`] | always | Versioned in-process map, for tests and simulations |
//! | [`RedisStore`](redis::RedisStore) | `redis` | `WATCH`/`MULTI`/`EXEC` over a dedicated connection |

mod error;
mod memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use error::{Result, StoreError};
pub use memory::{MemoryStore, MemoryTransaction};

use std::sync::Arc;

/// A key-value service holding shared totals.
///
/// Implementations must be usable from several threads; the counter keeps
/// at most one transaction open at a time per instance.
pub trait SharedStore: Send + Sync {
    /// The transaction handle returned by [`watch`](SharedStore::watch).
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Reads the total at `key`, `None` if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Unconditionally overwrites the total at `key`.
    fn set(&self, key: &str, value: u64) -> Result<()>;

    /// Starts an optimistic transaction on `key`.
    ///
    /// Dropping the returned transaction without committing releases the
    /// watch.
    fn watch<'a>(&'a self, key: &str) -> Result<Self::Transaction<'a>>;
}

/// An open watch on a single key.
pub trait StoreTransaction {
    /// Reads the watched key, `None` if it does not exist.
    fn get(&mut self) -> Result<Option<u64>>;

    /// Writes `value` if the key is unchanged since the watch was taken.
    ///
    /// Returns [`StoreError::Conflict`] otherwise, leaving the key as the
    /// other writer left it.
    fn commit(self, value: u64) -> Result<()>;
}

impl<S: SharedStore> SharedStore for &S {
    type Transaction<'a>
        = S::Transaction<'a>
    where
        Self: 'a;

    fn get(&self, key: &str) -> Result<Option<u64>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: u64) -> Result<()> {
        (**self).set(key, value)
    }

    fn watch<'a>(&'a self, key: &str) -> Result<Self::Transaction<'a>> {
        (**self).watch(key)
    }
}

impl<S: SharedStore> SharedStore for Arc<S> {
    type Transaction<'a>
        = S::Transaction<'a>
    where
        Self: 'a;

    fn get(&self, key: &str) -> Result<Option<u64>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: u64) -> Result<()> {
        (**self).set(key, value)
    }

    fn watch<'a>(&'a self, key: &str) -> Result<Self::Transaction<'a>> {
        (**self).watch(key)
    }
}

/// Parses the raw content of a key into a total.
pub(crate) fn parse_total(key: &str, raw: &[u8]) -> Result<u64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| StoreError::Malformed {
            key: key.to_string(),
            value: String::from_utf8_lossy(raw).into_owned(),
        })
}
