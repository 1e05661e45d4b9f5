//! Table observer for displaying reconciliation statistics.
//!
//! This module provides [`TableObserver`], which renders a collection of
//! [`StatsSnapshot`]s as a formatted ASCII table using the `tabled` crate,
//! one row per shared counter.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature:
//!
//! ```toml
//! [dependencies]
//! condiviso = { version = "0.1", features = ["table"] }
//! ```
//!
//! # Output Example
//!
//! ```text
//! ╭────────┬───────┬───────┬─────────────┬──────────┬─────────┬───────────┬──────────╮
//! │ Key    │ Local │ Known │ Unpublished │ Attempts │ Commits │ Conflicts │ Failures │
//! ├────────┼───────┼───────┼─────────────┼──────────┼─────────┼───────────┼──────────┤
//! │ clicks │ 1205  │ 1200  │ 5           │ 12       │ 11      │ 1         │ 1        │
//! ╰────────┴───────┴───────┴─────────────┴──────────┴─────────┴───────────┴──────────╯
//! ```

use super::Result;
use crate::stats::StatsSnapshot;
use std::io::Write;
use tabled::{settings::Style, Table, Tabled};

/// Available table styles for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// Modern style with clean lines
    Modern,
    /// GitHub-flavored Markdown table
    Markdown,
    /// No borders, just spacing
    Blank,
}

#[derive(Tabled)]
struct StatsRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Local")]
    local: u64,
    #[tabled(rename = "Known")]
    known: u64,
    #[tabled(rename = "Unpublished")]
    unpublished: u64,
    #[tabled(rename = "Attempts")]
    attempts: u64,
    #[tabled(rename = "Commits")]
    commits: u64,
    #[tabled(rename = "Conflicts")]
    conflicts: u64,
    #[tabled(rename = "Failures")]
    failures: u64,
}

impl From<&StatsSnapshot> for StatsRow {
    fn from(s: &StatsSnapshot) -> Self {
        Self {
            key: if s.key.is_empty() {
                "(unnamed)".to_string()
            } else {
                s.key.clone()
            },
            local: s.local_total,
            known: s.last_known_remote_total,
            unpublished: s.unpublished(),
            attempts: s.attempts,
            commits: s.commits,
            conflicts: s.conflicts,
            failures: s.failures,
        }
    }
}

/// An observer that renders snapshots as a formatted table.
///
/// # Examples
///
/// ```rust,ignore
/// use condiviso::observers::table::{TableObserver, TableStyle};
///
/// let output = TableObserver::new()
///     .with_style(TableStyle::Markdown)
///     .with_title("Shared counters")
///     .render(&[counter.stats()]);
/// println!("{}", output);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    style: TableStyle,
    title: Option<String>,
}

impl TableObserver {
    /// Creates a new table observer with the default style.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table style.
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.style = style;
        self
    }

    /// Sets a title printed above the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Renders `snapshots` to a string.
    pub fn render<'a>(&self, snapshots: impl IntoIterator<Item = &'a StatsSnapshot>) -> String {
        let rows: Vec<StatsRow> = snapshots.into_iter().map(StatsRow::from).collect();
        let mut table = Table::new(&rows);
        self.apply_style(&mut table);

        match &self.title {
            Some(title) => format!("{}\n{}", title, table),
            None => table.to_string(),
        }
    }

    /// Renders `snapshots` into `writer`, followed by a newline.
    pub fn write<'a, W: Write>(
        &self,
        mut writer: W,
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> Result<()> {
        writeln!(writer, "{}", self.render(snapshots))?;
        Ok(())
    }

    fn apply_style(&self, table: &mut Table) {
        match self.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }
}
