#![allow(clippy::doc_markdown)] // Allow technical terms like SQL, axum in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Profiler
//!
//! Debugging and profiling helpers for web requests and background tasks.
//!
//! ## Overview
//!
//! Each unit of work (one HTTP request, one task execution) records the
//! statements it executes into its own [`QueryLog`]. When the unit of work is
//! slow, its batch is handed to [`report::QueryReport`], which logs the slow
//! statements, the slowest statements overall, and per-table query counts and
//! total time.
//!
//! ## Module Organization
//!
//! - [`query_log`] - Per-unit-of-work statement batches
//! - [`report`] - Slow query aggregation and output sinks
//! - [`web`] - axum middleware for slow request reporting
//! - [`task_hooks`] - Pre/post hooks for background tasks
//! - [`profilers`] - Closure wrappers: timing, query counting, memory, CPU
//! - [`n_plus_one`] - Repeated statement detection
//! - [`memory`] - Process memory sampling
//! - [`config`] - Thresholds and limits, loaded from file and environment
//! - [`logging`] - Structured logging setup
//! - [`error`] - Error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Extension, Router};
//! use std::time::Duration;
//! use tasker_profiler::{web, ConfigManager, QueryLog, RequestProfiler};
//!
//! async fn orders(Extension(queries): Extension<QueryLog>) -> &'static str {
//!     queries.record(r#"SELECT * FROM "orders""#, Duration::from_millis(12));
//!     "orders"
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! tasker_profiler::logging::init_structured_logging();
//! let config = ConfigManager::load()?;
//! let profiler = RequestProfiler::new(std::sync::Arc::new(config.config().clone()));
//!
//! let app: Router = web::apply_middleware_stack(Router::new().route("/orders", get(orders)), profiler);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod n_plus_one;
pub mod profilers;
pub mod query_log;
pub mod report;
pub mod task_hooks;
pub mod web;

pub use config::{ConfigManager, ConfigurationError, ProfilerConfig};
pub use error::{ProfilerError, Result};
pub use n_plus_one::{NPlusOneDetector, RepeatedQuery};
pub use profilers::FunctionProfiler;
pub use query_log::{QueryLog, QueryRecord};
pub use report::{report, report_with, QueryReport, ReportSettings, ReportSink};
pub use task_hooks::{TaskOutcome, TaskProfiler, TaskRun};
pub use web::RequestProfiler;
