//! In-process shared store.
//!
//! [`MemoryStore`] keeps every key as a raw string plus a version number.
//! A transaction remembers the version it watched and refuses to commit if
//! the version moved, which is exactly the contract Redis `WATCH` gives.
//!
//! Besides serving tests and single-host simulations, the store can be told
//! to fail the next few operations ([`fail_next`](MemoryStore::fail_next))
//! and can hold arbitrary raw content ([`set_raw`](MemoryStore::set_raw)),
//! so error paths of the reconciler can be driven deterministically.

use super::{parse_total, Result, SharedStore, StoreError, StoreTransaction};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
struct Entry {
    raw: String,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_version: u64,
}

impl Inner {
    fn version_of(&self, key: &str) -> u64 {
        self.entries.get(key).map_or(0, |e| e.version)
    }

    fn write(&mut self, key: &str, raw: String) {
        self.next_version += 1;
        let version = self.next_version;
        self.entries
            .insert(key.to_string(), Entry { raw, version });
    }

    fn read(&self, key: &str) -> Result<Option<u64>> {
        self.entries
            .get(key)
            .map(|e| parse_total(key, e.raw.as_bytes()))
            .transpose()
    }
}

/// A versioned in-memory key-value store with optimistic transactions.
///
/// # Examples
///
/// ```rust
/// use condiviso::store::{MemoryStore, SharedStore, StoreTransaction};
///
/// let store = MemoryStore::new();
/// store.set("total", 100).unwrap();
///
/// let mut txn = store.watch("total").unwrap();
/// let current = txn.get().unwrap().unwrap_or(0);
/// txn.commit(current + 5).unwrap();
///
/// assert_eq!(store.get("total").unwrap(), Some(105));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    pending_failures: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes raw content at `key`, bypassing integer encoding.
    pub fn set_raw(&self, key: &str, raw: impl Into<String>) {
        self.inner.lock().write(key, raw.into());
    }

    /// Makes the next `n` operations fail with [`StoreError::Unavailable`].
    ///
    /// `watch`, both `get`s, `set` and `commit` each consume one failure.
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, Ordering::Release);
    }

    /// Returns the number of keys in the store.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns `true` if the store holds no key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        let consumed = self
            .pending_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            Err(StoreError::Unavailable("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SharedStore for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn get(&self, key: &str) -> Result<Option<u64>> {
        self.check_available()?;
        self.inner.lock().read(key)
    }

    fn set(&self, key: &str, value: u64) -> Result<()> {
        self.check_available()?;
        self.inner.lock().write(key, value.to_string());
        Ok(())
    }

    fn watch<'a>(&'a self, key: &str) -> Result<MemoryTransaction<'a>> {
        self.check_available()?;
        let watched_version = self.inner.lock().version_of(key);
        Ok(MemoryTransaction {
            store: self,
            key: key.to_string(),
            watched_version,
        })
    }
}

/// A watch on one key of a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    key: String,
    watched_version: u64,
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn get(&mut self) -> Result<Option<u64>> {
        self.store.check_available()?;
        self.store.inner.lock().read(&self.key)
    }

    fn commit(self, value: u64) -> Result<()> {
        self.store.check_available()?;
        let mut inner = self.store.inner.lock();
        if inner.version_of(&self.key) != self.watched_version {
            return Err(StoreError::Conflict(self.key));
        }
        inner.write(&self.key, value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nope").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_get() {
        let store = MemoryStore::new();
        store.set("a", 1).unwrap();
        store.set("b", 2).unwrap();
        store.set("a", 3).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(3));
        assert_eq!(store.get("b").unwrap(), Some(2));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_commit_unchanged_key() {
        let store = MemoryStore::new();
        store.set("k", 10).unwrap();

        let mut txn = store.watch("k").unwrap();
        assert_eq!(txn.get().unwrap(), Some(10));
        txn.commit(15).unwrap();

        assert_eq!(store.get("k").unwrap(), Some(15));
    }

    #[test]
    fn test_commit_on_missing_key() {
        let store = MemoryStore::new();
        let mut txn = store.watch("k").unwrap();
        assert_eq!(txn.get().unwrap(), None);
        txn.commit(1).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(1));
    }

    #[test]
    fn test_conflict_after_concurrent_write() {
        let store = MemoryStore::new();
        store.set("k", 10).unwrap();

        let mut txn = store.watch("k").unwrap();
        assert_eq!(txn.get().unwrap(), Some(10));
        store.set("k", 20).unwrap();

        let err = txn.commit(15).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get("k").unwrap(), Some(20));
    }

    #[test]
    fn test_same_value_rewrite_still_conflicts() {
        let store = MemoryStore::new();
        store.set("k", 10).unwrap();

        let txn = store.watch("k").unwrap();
        store.set("k", 10).unwrap();

        assert!(txn.commit(11).unwrap_err().is_conflict());
    }

    #[test]
    fn test_conflict_when_key_created_after_watch() {
        let store = MemoryStore::new();
        let txn = store.watch("k").unwrap();
        store.set("k", 1).unwrap();
        assert!(txn.commit(2).unwrap_err().is_conflict());
    }

    #[test]
    fn test_other_keys_do_not_conflict() {
        let store = MemoryStore::new();
        store.set("k", 1).unwrap();
        let txn = store.watch("k").unwrap();
        store.set("other", 99).unwrap();
        txn.commit(2).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(2));
    }

    #[test]
    fn test_malformed_raw_value() {
        let store = MemoryStore::new();
        store.set_raw("k", "not a number");

        assert!(matches!(
            store.get("k").unwrap_err(),
            StoreError::Malformed { .. }
        ));
        let mut txn = store.watch("k").unwrap();
        assert!(matches!(txn.get().unwrap_err(), StoreError::Malformed { .. }));
    }

    #[test]
    fn test_injected_failures() {
        let store = MemoryStore::new();
        store.set("k", 5).unwrap();
        store.fail_next(2);

        assert!(store.get("k").unwrap_err().is_transport());
        assert!(store.watch("k").unwrap_err().is_transport());
        assert_eq!(store.get("k").unwrap(), Some(5));
    }

    #[test]
    fn test_concurrent_transactions_single_winner() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let store = Arc::new(MemoryStore::new());
        store.set("k", 0).unwrap();

        // Every thread watches before anyone commits.
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut txn = store.watch("k").unwrap();
                    let current = txn.get().unwrap().unwrap_or(0);
                    barrier.wait();
                    txn.commit(current + i + 1).is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
