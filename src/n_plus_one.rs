//! # N+1 Query Detection
//!
//! Flags statement shapes executed repeatedly within one unit of work, the
//! usual symptom of loading a relation row by row inside a loop. Statements are
//! grouped after replacing literals with placeholders, so
//! `... WHERE "id" = 1` and `... WHERE "id" = 2` count as the same shape.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

use crate::config::NPlusOneConfig;
use crate::query_log::{QueryLog, QueryRecord};
use crate::report::extract_table;

static STRING_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'(?:[^']|'')*'").expect("hardcoded regex pattern is valid")
});

static NUMERIC_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(?:\.\d+)?\b").expect("hardcoded regex pattern is valid")
});

static IN_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bIN\s*\(\s*\?(?:\s*,\s*\?)*\s*\)")
        .expect("hardcoded regex pattern is valid")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("hardcoded regex pattern is valid"));

/// Statement shape with literals replaced by `?` and whitespace collapsed
pub fn normalize_sql(sql: &str) -> String {
    let normalized = STRING_LITERAL.replace_all(sql, "?");
    let normalized = NUMERIC_LITERAL.replace_all(&normalized, "?");
    let normalized = IN_LIST.replace_all(&normalized, "IN (...)");
    WHITESPACE.replace_all(&normalized, " ").trim().to_string()
}

/// One statement shape executed at least `min_repeats` times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatedQuery {
    pub statement: String,
    pub table: String,
    pub count: usize,
    pub total_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct NPlusOneDetector {
    min_repeats: usize,
    ignore_tables: Vec<String>,
}

impl Default for NPlusOneDetector {
    fn default() -> Self {
        Self::from_config(&NPlusOneConfig::default())
    }
}

impl NPlusOneDetector {
    pub fn new(min_repeats: usize, ignore_tables: Vec<String>) -> Self {
        Self {
            min_repeats: min_repeats.max(1),
            ignore_tables,
        }
    }

    pub fn from_config(config: &NPlusOneConfig) -> Self {
        Self::new(config.min_repeats, config.ignore_tables.clone())
    }

    /// Repeated shapes in `records`, most repeated first (ties by first appearance)
    pub fn detect(&self, records: &[QueryRecord]) -> Vec<RepeatedQuery> {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut groups: Vec<RepeatedQuery> = Vec::new();

        for record in records {
            let statement = normalize_sql(&record.sql);
            match positions.get(&statement) {
                Some(&position) => {
                    if let Some(group) = groups.get_mut(position) {
                        group.count += 1;
                        group.total_seconds += record.elapsed_seconds;
                    }
                }
                None => {
                    positions.insert(statement.clone(), groups.len());
                    groups.push(RepeatedQuery {
                        table: extract_table(&record.sql).to_string(),
                        statement,
                        count: 1,
                        total_seconds: record.elapsed_seconds,
                    });
                }
            }
        }

        let mut repeated: Vec<RepeatedQuery> = groups
            .into_iter()
            .filter(|group| group.count >= self.min_repeats)
            .filter(|group| !self.ignore_tables.iter().any(|t| t == &group.table))
            .collect();
        repeated.sort_by(|a, b| b.count.cmp(&a.count));
        repeated
    }

    /// Detect repeated shapes and log a warning for each
    pub fn detect_and_log(&self, label: &str, records: &[QueryRecord]) -> Vec<RepeatedQuery> {
        let repeated = self.detect(records);
        for query in &repeated {
            warn!(
                label = %label,
                table = %query.table,
                count = query.count,
                total_seconds = query.total_seconds,
                "Potential N+1 query: {} executed {} times",
                query.statement,
                query.count
            );
        }
        repeated
    }

    /// Run `f` against a freshly reset `log` and warn about repeated statements it executed
    pub fn check<F, T>(&self, label: &str, log: &QueryLog, f: F) -> T
    where
        F: FnOnce(&QueryLog) -> T,
    {
        log.reset();
        let output = f(log);
        self.detect_and_log(label, &log.snapshot());
        output
    }
}
