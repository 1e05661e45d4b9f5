//! Observers rendering reconciliation statistics.
//!
//! Observers turn [`StatsSnapshot`](crate::stats::StatsSnapshot)s, one per
//! shared counter, into something a human or a scraper can read:
//!
//! - [`table`] - Pretty-print snapshots as tables using the `tabled` crate
//! - [`json`] - Serialize snapshots to JSON
//!
//! # Feature Flags
//!
//! - `table` - Enables the [`table`] module
//! - `json` - Enables the [`json`] module
//! - `full` - Enables every observer and the Redis store
//!
//! # Example
//!
//! ```rust,ignore
//! use condiviso::observers::json::JsonObserver;
//! use condiviso::observers::table::TableObserver;
//!
//! let snapshots = vec![clicks.stats(), views.stats()];
//! println!("{}", TableObserver::new().render(&snapshots));
//! println!("{}", JsonObserver::new().pretty(true).to_json(&snapshots)?);
//! ```

mod error;

pub use error::{ObserverError, Result};

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "json")]
pub mod json;
