//! # Condiviso - Shared Counters Reconciled Through an Optimistic Store
//!
//! A Rust library for counters that many independent processes increment
//! concurrently while agreeing, approximately, on one shared total. Increments
//! never wait on the network: each process absorbs them locally and
//! periodically merges its own contribution into a shared key-value store
//! under an optimistic (watch / compare-and-swap) transaction.
//!
//! ## The Problem
//!
//! The naive approach sends every increment to a shared store (`INCRBY` on
//! Redis, an `UPDATE` on a database). Correct, but every request pays a
//! network round-trip, and the store sees as many writes as the whole fleet
//! sees requests.
//!
//! ## The Solution: Local Accumulation, Periodic Reconciliation
//!
//! ```text
//!   ┌───────────── instance A ─────────────┐      ┌─────────────┐
//!   │ add(n) ──► LocalAccumulator (atomic) │      │             │
//!   │               │   every interval     │ CAS  │   shared    │
//!   │               └──► Reconciler ───────┼─────►│    store    │
//!   └──────────────────────────────────────┘      │             │
//!   ┌───────────── instance B ─────────────┐      │  key: total │
//!   │               ...                ────┼─────►│             │
//!   └──────────────────────────────────────┘      └─────────────┘
//! ```
//!
//! ### Design Principles
//!
//! 1. **Local absorption**: [`add`](counter::SharedCounter::add) is a single
//!    atomic update unless a reconciliation is due.
//!
//! 2. **Self-limiting reconciliation**: a reconciliation runs inline, at most
//!    once per refresh interval, whatever the request rate. There is no
//!    background thread.
//!
//! 3. **Commutative merge**: each instance only ever adds *its own* unpublished
//!    delta on top of the total it read, so the order of commits across the
//!    fleet does not matter. See [`reconciler`].
//!
//! 4. **Optimistic publication**: the read and the write happen inside a
//!    watched transaction; a concurrent writer makes the commit fail, and the
//!    local state is left untouched for the next cycle.
//!
//! 5. **Never backwards**: a shared total read below what this instance
//!    already published (a stale replica, a manual reset) is clamped.
//!
//! ## Quick Start
//!
//! ```rust
//! use condiviso::config::CounterConfig;
//! use condiviso::counter::SharedCounter;
//! use condiviso::store::MemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(MemoryStore::new());
//! let config = CounterConfig::new()
//!     .with_key("clicks")
//!     .with_refresh_interval(Duration::from_secs(1));
//!
//! let a = SharedCounter::new(Arc::clone(&store), config.clone());
//! let b = SharedCounter::new(Arc::clone(&store), config);
//!
//! a.add(10);
//! b.add(32);
//!
//! a.sync_now().unwrap();
//! b.sync_now().unwrap();
//! a.sync_now().unwrap();
//!
//! assert_eq!(a.get(), 42);
//! assert_eq!(b.get(), 42);
//! ```
//!
//! ## Consistency
//!
//! Totals are eventually consistent: an instance's view lags the fleet by at
//! most one refresh interval plus any cycles lost to conflicts or store
//! outages. Increments absorbed since the last successful reconciliation are
//! lost if the process crashes.
//!
//! ## Stores
//!
//! | Store | Feature | Description |
//! |-------|---------|-------------|
//! | [`MemoryStore`](store::MemoryStore) | always | Versioned in-process map |
//! | [`RedisStore`](store::redis::RedisStore) | `redis` | `WATCH`/`MULTI`/`EXEC` on a dedicated connection |
//!
//! Any other key-value service offering a watch-guarded transaction can be
//! plugged in by implementing [`SharedStore`](store::SharedStore).
//!
//! ## Observers
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `table` | [`observers::table`] | Pretty-print reconciliation statistics as tables |
//! | `json` | [`observers::json`] | Serialize reconciliation statistics to JSON |
//! | `full` | All observers | Enables all observer modules and the Redis store |
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events: `debug` for every committed
//! reconciliation, `warn` for conflicts, rewinds and store failures. Install
//! any subscriber to see them.

pub mod accumulator;
pub mod config;
pub mod counter;
pub mod observers;
pub mod reconciler;
pub mod stats;
pub mod store;
