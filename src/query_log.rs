//! # Query Log
//!
//! Explicit per-unit-of-work collection of executed statements. Each request or
//! task owns its own [`QueryLog`]; reporting receives an immutable
//! [`QueryLog::snapshot`] rather than reading any shared global list.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One executed database statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub sql: String,
    pub elapsed_seconds: f64,
}

impl QueryRecord {
    /// Create a record. Negative or non-finite elapsed values are clamped to zero.
    pub fn new(sql: impl Into<String>, elapsed_seconds: f64) -> Self {
        let elapsed_seconds = if elapsed_seconds.is_finite() && elapsed_seconds > 0.0 {
            elapsed_seconds
        } else {
            0.0
        };
        Self {
            sql: sql.into(),
            elapsed_seconds,
        }
    }

    pub fn from_duration(sql: impl Into<String>, elapsed: Duration) -> Self {
        Self::new(sql, elapsed.as_secs_f64())
    }
}

/// Shared handle to the statements executed during one unit of work.
///
/// Cloning yields another handle to the same batch, so a middleware can hand a
/// clone to request handlers and read the batch back once they finish.
#[derive(Debug, Clone, Default)]
pub struct QueryLog {
    records: Arc<Mutex<Vec<QueryRecord>>>,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, sql: impl Into<String>, elapsed: Duration) {
        self.push(QueryRecord::from_duration(sql, elapsed));
    }

    pub fn push(&self, record: QueryRecord) {
        self.records.lock().push(record);
    }

    /// Await `query`, recording `sql` with the time it took
    pub async fn track<F, T>(&self, sql: impl Into<String>, query: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = query.await;
        self.record(sql, started.elapsed());
        output
    }

    /// Run `query`, recording `sql` with the time it took
    pub fn time<F, T>(&self, sql: impl Into<String>, query: F) -> T
    where
        F: FnOnce() -> T,
    {
        let started = Instant::now();
        let output = query();
        self.record(sql, started.elapsed());
        output
    }

    /// Copy of the batch as it stands now
    pub fn snapshot(&self) -> Vec<QueryRecord> {
        self.records.lock().clone()
    }

    /// Drop every recorded statement
    pub fn reset(&self) {
        self.records.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Sum of elapsed seconds over the batch
    pub fn total_time(&self) -> f64 {
        self.records
            .lock()
            .iter()
            .fold(0.0, |total, r| total + r.elapsed_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_and_nan_elapsed_are_clamped() {
        assert_eq!(QueryRecord::new("SELECT 1", -0.5).elapsed_seconds, 0.0);
        assert_eq!(QueryRecord::new("SELECT 1", f64::NAN).elapsed_seconds, 0.0);
        assert_eq!(QueryRecord::new("SELECT 1", 0.25).elapsed_seconds, 0.25);
    }

    #[test]
    fn clones_share_one_batch() {
        let log = QueryLog::new();
        let handler_view = log.clone();

        handler_view.record("SELECT * FROM \"users\"", Duration::from_millis(10));
        handler_view.push(QueryRecord::new("SELECT * FROM \"orders\"", 0.002));

        assert_eq!(log.len(), 2);
        assert!((log.total_time() - 0.012).abs() < 1e-9);
    }

    #[test]
    fn snapshot_is_detached_from_later_records() {
        let log = QueryLog::new();
        log.push(QueryRecord::new("SELECT 1", 0.1));

        let snapshot = log.snapshot();
        log.push(QueryRecord::new("SELECT 2", 0.1));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn reset_empties_the_batch() {
        let log = QueryLog::new();
        log.push(QueryRecord::new("SELECT 1", 0.1));
        log.reset();

        assert!(log.is_empty());
        assert_eq!(log.total_time(), 0.0);
        assert!(log.total_time().is_sign_positive());
    }

    #[test]
    fn time_records_statement_and_returns_output() {
        let log = QueryLog::new();
        let rows = log.time("SELECT * FROM \"users\"", || vec![1, 2, 3]);

        assert_eq!(rows, vec![1, 2, 3]);
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].sql, "SELECT * FROM \"users\"");
        assert!(snapshot[0].elapsed_seconds >= 0.0);
    }

    #[tokio::test]
    async fn track_records_async_statement() {
        let log = QueryLog::new();
        let count = log
            .track("SELECT COUNT(*) FROM \"orders\"", async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                42
            })
            .await;

        assert_eq!(count, 42);
        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].elapsed_seconds >= 0.005);
    }

    #[test]
    fn track_can_be_driven_without_a_runtime_handle() {
        let log = QueryLog::new();
        let value = tokio_test::block_on(log.track("SELECT 1", async { "done" }));

        assert_eq!(value, "done");
        assert_eq!(log.len(), 1);
    }
}
