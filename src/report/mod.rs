//! # Slow Query Report
//!
//! Aggregates one unit of work's executed statements into a readable summary:
//! the slow statements, the slowest statements overall, per-table query counts
//! and per-table total time, and the batch totals.
//!
//! Reporting never fails its caller. [`report`] and [`report_with`] log any sink
//! failure and carry on, so a request or task is never affected by the
//! profiler watching it.
//!
//! ```rust
//! use tasker_profiler::query_log::QueryRecord;
//! use tasker_profiler::report::{report_with, MemorySink, ReportSettings};
//!
//! let records = vec![
//!     QueryRecord::new(r#"SELECT a, b FROM "users""#, 0.05),
//!     QueryRecord::new(r#"SELECT * FROM "orders""#, 0.001),
//!     QueryRecord::new("garbage", 0.03),
//! ];
//!
//! let mut sink = MemorySink::new();
//! let report = report_with("/users", &records, &ReportSettings::default(), &mut sink);
//!
//! assert_eq!(report.total_count, 3);
//! assert_eq!(report.total_seconds_rounded(), 0.081);
//! ```

pub mod sink;
pub mod tables;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::error;

use crate::error::Result;
use crate::query_log::QueryRecord;

pub use sink::{
    shared_console_sink, ConsoleSink, MemorySink, ReportSink, SharedSink, SinkEntry, TracingSink,
};
pub use tables::{
    counts_per_table, extract_table, times_per_table, TableCount, TableTime, OTHER_TABLE,
};

/// Width of the dashed separator between report sections
pub const SEPARATOR_WIDTH: usize = 100;

static SELECT_COLUMNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SELECT (.*?) FROM").expect("hardcoded regex pattern is valid")
});

/// Thresholds and limits applied when building a report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReportSettings {
    pub slow_query_threshold: f64,
    pub top_slowest: usize,
    pub top_tables: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            slow_query_threshold: 0.02,
            top_slowest: 5,
            top_tables: 10,
        }
    }
}

/// Aggregated view of one batch of executed statements
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryReport {
    pub label: String,
    pub settings: ReportSettings,
    /// Statements over the slow threshold, fastest first
    pub slow_queries: Vec<QueryRecord>,
    /// The `top_slowest` slowest statements, slowest first
    pub slowest: Vec<QueryRecord>,
    /// Every table with its statement count, most frequent first
    pub counts_per_table: Vec<TableCount>,
    /// Every table with its summed time, slowest first
    pub times_per_table: Vec<TableTime>,
    pub total_count: usize,
    pub total_seconds: f64,
}

impl QueryReport {
    pub fn build(
        label: impl Into<String>,
        records: &[QueryRecord],
        settings: &ReportSettings,
    ) -> Self {
        let mut slow_queries: Vec<QueryRecord> = records
            .iter()
            .filter(|record| record.elapsed_seconds > settings.slow_query_threshold)
            .cloned()
            .collect();
        slow_queries.sort_by(|a, b| a.elapsed_seconds.total_cmp(&b.elapsed_seconds));

        let mut slowest: Vec<QueryRecord> = records.to_vec();
        slowest.sort_by(|a, b| b.elapsed_seconds.total_cmp(&a.elapsed_seconds));
        slowest.truncate(settings.top_slowest);

        Self {
            label: label.into(),
            settings: *settings,
            slow_queries,
            slowest,
            counts_per_table: counts_per_table(records),
            times_per_table: times_per_table(records),
            total_count: records.len(),
            total_seconds: records
                .iter()
                .fold(0.0, |total, record| total + record.elapsed_seconds),
        }
    }

    /// Total elapsed seconds rounded to milliseconds
    pub fn total_seconds_rounded(&self) -> f64 {
        round_to_millis(self.total_seconds)
    }

    /// Rows shown in the query count table
    pub fn top_counts(&self) -> &[TableCount] {
        let shown = self.counts_per_table.len().min(self.settings.top_tables);
        &self.counts_per_table[..shown]
    }

    /// Rows shown in the total time table
    pub fn top_times(&self) -> &[TableTime] {
        let shown = self.times_per_table.len().min(self.settings.top_tables);
        &self.times_per_table[..shown]
    }

    /// Slowest statements with their column lists elided, one per line
    pub fn slowest_lines(&self) -> Vec<String> {
        self.slowest
            .iter()
            .map(|record| {
                format!(
                    "{} - {} (sec)",
                    compact_select(&record.sql),
                    record.elapsed_seconds
                )
            })
            .collect()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} Queries - Total time: {} (sec)",
            self.total_count,
            self.total_seconds_rounded()
        )
    }

    /// Write the report to `sink`
    pub fn emit<S: ReportSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        let separator = "-".repeat(SEPARATOR_WIDTH);

        sink.line(&self.label)?;
        for query in &self.slow_queries {
            sink.line(&format!(
                "Slow query: sql: {} time: {}",
                query.sql, query.elapsed_seconds
            ))?;
        }
        sink.line(&separator)?;

        sink.line(&format!(
            "TOP {} SLOWEST QUERIES: {}",
            self.settings.top_slowest,
            self.slowest_lines().join("\n")
        ))?;
        sink.line(&separator)?;

        sink.block(&tables::render_counts(self.top_counts()))?;
        sink.block(&tables::render_times(self.top_times()))?;
        sink.block(&self.summary_line())
    }
}

/// Replace the first `SELECT <columns> FROM` with `SELECT ... FROM`
pub fn compact_select(sql: &str) -> String {
    SELECT_COLUMNS
        .replacen(sql, 1, "SELECT ... FROM")
        .into_owned()
}

fn round_to_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// Build and emit a report with default settings to the console
pub fn report(label: &str, records: &[QueryRecord]) {
    report_with(
        label,
        records,
        &ReportSettings::default(),
        &mut ConsoleSink::stdout(),
    );
}

/// Build a report and emit it to `sink`, logging (not returning) sink failures
pub fn report_with<S: ReportSink + ?Sized>(
    label: &str,
    records: &[QueryRecord],
    settings: &ReportSettings,
    sink: &mut S,
) -> QueryReport {
    let query_report = QueryReport::build(label, records, settings);
    if let Err(e) = query_report.emit(sink) {
        error!(
            label = %label,
            error = %e,
            "Failed to emit slow query report"
        );
    }
    query_report
}
