//! Per-table rollups and plain-text table rendering.
//!
//! Table names come from a best-effort match of `FROM "<name>"`; statements
//! without that shape (raw SQL, unquoted identifiers, DDL) land in the
//! [`OTHER_TABLE`] bucket. No SQL parsing is attempted.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::query_log::QueryRecord;

/// Bucket for statements without a recognizable table
pub const OTHER_TABLE: &str = "OTHER";

pub const TABLE_HEADER: &str = "Table";
pub const QUERY_COUNT_HEADER: &str = "Query Count";
pub const TOTAL_TIME_HEADER: &str = "Total Time (sec)";

static TABLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"FROM "(.*?)""#).expect("hardcoded regex pattern is valid"));

/// Table name of the first `FROM "<name>"` in `sql`, or [`OTHER_TABLE`]
pub fn extract_table(sql: &str) -> &str {
    TABLE_PATTERN
        .captures(sql)
        .and_then(|captures| captures.get(1))
        .map(|name| name.as_str())
        .unwrap_or(OTHER_TABLE)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    pub table: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableTime {
    pub table: String,
    pub total_seconds: f64,
}

/// Fold `records` per table, keeping tables in first-seen order
fn fold_by_table<V, F>(records: &[QueryRecord], mut fold: F) -> Vec<(String, V)>
where
    V: Default,
    F: FnMut(&mut V, &QueryRecord),
{
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut rollup: Vec<(String, V)> = Vec::new();

    for record in records {
        let table = extract_table(&record.sql);
        let position = *positions.entry(table).or_insert_with(|| {
            rollup.push((table.to_string(), V::default()));
            rollup.len() - 1
        });
        if let Some((_, value)) = rollup.get_mut(position) {
            fold(value, record);
        }
    }

    rollup
}

/// Query count for every table, most frequent first. Ties keep first-seen order.
pub fn counts_per_table(records: &[QueryRecord]) -> Vec<TableCount> {
    let mut counts: Vec<TableCount> = fold_by_table(records, |count: &mut usize, _| *count += 1)
        .into_iter()
        .map(|(table, count)| TableCount { table, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Summed elapsed seconds for every table, slowest first. Ties keep first-seen order.
pub fn times_per_table(records: &[QueryRecord]) -> Vec<TableTime> {
    let mut times: Vec<TableTime> = fold_by_table(records, |total: &mut f64, record| {
        *total += record.elapsed_seconds
    })
    .into_iter()
    .map(|(table, total_seconds)| TableTime {
        table,
        total_seconds,
    })
    .collect();
    times.sort_by(|a, b| b.total_seconds.total_cmp(&a.total_seconds));
    times
}

/// Render a two-column table: text column left-aligned, value column right-aligned
pub fn render_table(headers: (&str, &str), rows: &[(String, String)]) -> String {
    let name_width = rows
        .iter()
        .map(|(name, _)| name.chars().count())
        .chain(std::iter::once(headers.0.chars().count()))
        .max()
        .unwrap_or(0);
    let value_width = rows
        .iter()
        .map(|(_, value)| value.chars().count())
        .chain(std::iter::once(headers.1.chars().count()))
        .max()
        .unwrap_or(0);

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format!(
        "{:<name_width$}  {:>value_width$}",
        headers.0, headers.1
    ));
    lines.push(format!(
        "{}  {}",
        "-".repeat(name_width),
        "-".repeat(value_width)
    ));
    for (name, value) in rows {
        lines.push(format!("{name:<name_width$}  {value:>value_width$}"));
    }

    lines
        .iter()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_counts(counts: &[TableCount]) -> String {
    let rows: Vec<(String, String)> = counts
        .iter()
        .map(|row| (row.table.clone(), row.count.to_string()))
        .collect();
    render_table((TABLE_HEADER, QUERY_COUNT_HEADER), &rows)
}

pub fn render_times(times: &[TableTime]) -> String {
    let rows: Vec<(String, String)> = times
        .iter()
        .map(|row| (row.table.clone(), format!("{:.4}", row.total_seconds)))
        .collect();
    render_table((TABLE_HEADER, TOTAL_TIME_HEADER), &rows)
}
