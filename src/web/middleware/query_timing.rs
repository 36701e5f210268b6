//! # Query Timing Middleware
//!
//! Times every request and reports the ones slower than
//! `request.slow_request_threshold`: a short request summary followed by the
//! full slow query report for the statements the handlers recorded.
//!
//! Handlers record statements into the request's log:
//!
//! ```rust,no_run
//! use axum::Extension;
//! use std::time::Duration;
//! use tasker_profiler::query_log::QueryLog;
//!
//! async fn list_orders(Extension(queries): Extension<QueryLog>) -> &'static str {
//!     queries.record(r#"SELECT * FROM "orders""#, Duration::from_millis(3));
//!     "ok"
//! }
//! ```

use axum::extract::{Request, State};
use axum::http::Uri;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::ProfilerConfig;
use crate::error::Result;
use crate::logging::log_unit_of_work;
use crate::query_log::{QueryLog, QueryRecord};
use crate::report::{report_with, shared_console_sink, ReportSink, SharedSink};

/// Shared state for [`profile_request`]
#[derive(Clone)]
pub struct RequestProfiler {
    config: Arc<ProfilerConfig>,
    sink: SharedSink,
}

impl std::fmt::Debug for RequestProfiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestProfiler")
            .field("config", &self.config)
            .finish()
    }
}

impl Default for RequestProfiler {
    fn default() -> Self {
        Self::new(Arc::new(ProfilerConfig::default()))
    }
}

impl RequestProfiler {
    /// Report to the console
    pub fn new(config: Arc<ProfilerConfig>) -> Self {
        Self::with_sink(config, shared_console_sink())
    }

    pub fn with_sink(config: Arc<ProfilerConfig>, sink: SharedSink) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    /// Report a finished request if it was slow. Returns whether a report was emitted.
    pub fn finish(&self, label: &str, elapsed: Duration, records: &[QueryRecord]) -> bool {
        let request_config = &self.config.request;

        if elapsed.as_secs_f64() < request_config.slow_request_threshold {
            log_unit_of_work("request", label, elapsed, records.len(), false);
            return false;
        }

        let mut sink = self.sink.lock();
        if let Err(e) = emit_request_summary(
            &mut *sink,
            label,
            elapsed,
            records,
            request_config.slow_query_threshold,
        ) {
            error!(label = %label, error = %e, "Failed to emit slow request summary");
        }
        report_with(label, records, &self.config.report_settings(), &mut *sink);

        log_unit_of_work("request", label, elapsed, records.len(), true);
        true
    }
}

fn emit_request_summary(
    sink: &mut (dyn ReportSink + Send),
    label: &str,
    elapsed: Duration,
    records: &[QueryRecord],
    slow_query_threshold: f64,
) -> Result<()> {
    let queries_total = records
        .iter()
        .fold(0.0, |total, record| total + record.elapsed_seconds);

    sink.line(label)?;
    sink.line(&format!("Total time: {}", elapsed.as_secs_f64()))?;
    sink.line(&format!("Queries Total time: {queries_total}"))?;
    sink.line(&format!("Queries: {}", records.len()))?;

    let mut slow: Vec<&QueryRecord> = records
        .iter()
        .filter(|record| record.elapsed_seconds > slow_query_threshold)
        .collect();
    slow.sort_by(|a, b| a.elapsed_seconds.total_cmp(&b.elapsed_seconds));

    for query in slow {
        sink.line(&format!(
            "Slow query: sql: {} time: {}",
            query.sql, query.elapsed_seconds
        ))?;
    }
    Ok(())
}

/// Path plus query string, e.g. `/orders?page=2`
fn request_label(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|path_and_query| path_and_query.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Slow request profiling middleware
///
/// Inserts a fresh [`QueryLog`] into the request extensions, runs the rest of
/// the stack, and passes the elapsed time and recorded statements to
/// [`RequestProfiler::finish`]. The response is always returned untouched.
pub async fn profile_request(
    State(profiler): State<RequestProfiler>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let label = request_label(request.uri());
    let query_log = QueryLog::new();
    request.extensions_mut().insert(query_log.clone());

    debug!(request_id = %request_id, label = %label, "Profiling request");

    let started = Instant::now();
    let response = next.run(request).await;
    let elapsed = started.elapsed();

    let span = tracing::warn_span!("slow_request", request_id = %request_id);
    span.in_scope(|| profiler.finish(&label, elapsed, &query_log.snapshot()));

    response
}
