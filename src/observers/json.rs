//! JSON observer for serializing reconciliation statistics.
//!
//! This module provides [`JsonObserver`], which serializes a collection of
//! [`StatsSnapshot`]s to JSON using serde.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! condiviso = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use condiviso::observers::json::JsonObserver;
//!
//! let json = JsonObserver::new().to_json(&[clicks.stats()])?;
//! // {"counters":[{"key":"clicks","local_total":1205,...}]}
//! ```

use super::Result;
use crate::stats::StatsSnapshot;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// A point-in-time capture of every observed counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsReport {
    /// Optional timestamp in milliseconds since Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp_ms: Option<u64>,
    /// One snapshot per counter.
    pub counters: Vec<StatsSnapshot>,
}

impl StatsReport {
    /// Finds a counter by key.
    pub fn get(&self, key: &str) -> Option<&StatsSnapshot> {
        self.counters.iter().find(|c| c.key == key)
    }
}

/// An observer that serializes snapshots to JSON.
///
/// # Examples
///
/// ```rust
/// use condiviso::observers::json::JsonObserver;
/// use condiviso::stats::StatsSnapshot;
///
/// let snapshot = StatsSnapshot {
///     key: "clicks".to_string(),
///     local_total: 42,
///     ..Default::default()
/// };
///
/// let json = JsonObserver::new().to_json(&[snapshot]).unwrap();
/// assert!(json.starts_with(r#"{"counters":[{"key":"clicks","local_total":42"#));
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    pretty: bool,
    include_timestamp: bool,
}

impl JsonObserver {
    /// Creates a new JSON observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.pretty = enabled;
        self
    }

    /// Enables or disables the `timestamp_ms` field.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.include_timestamp = enabled;
        self
    }

    /// Collects `snapshots` into a [`StatsReport`].
    pub fn collect<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> StatsReport {
        let timestamp_ms = if self.include_timestamp {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|d| d.as_millis() as u64)
        } else {
            None
        };
        StatsReport {
            timestamp_ms,
            counters: snapshots.into_iter().cloned().collect(),
        }
    }

    /// Serializes `snapshots` to a JSON string.
    pub fn to_json<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> Result<String> {
        let report = self.collect(snapshots);
        let json = if self.pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        Ok(json)
    }

    /// Serializes `snapshots` into `writer`.
    pub fn write<'a, W: Write>(
        &self,
        writer: W,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> Result<()> {
        let report = self.collect(snapshots);
        if self.pretty {
            serde_json::to_writer_pretty(writer, &report)?;
        } else {
            serde_json::to_writer(writer, &report)?;
        }
        Ok(())
    }
}
