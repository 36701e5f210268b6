//! # Profiler Configuration
//!
//! Thresholds and limits for slow-query reporting, request and task gating,
//! and N+1 detection.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_profiler::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Defaults, then config/profiler.{toml,yaml,json}, then TASKER_PROFILER_* variables
//! let manager = ConfigManager::load()?;
//!
//! let threshold = manager.config().slow_query_threshold;
//! let request_gate = manager.config().request.slow_request_threshold;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::report::ReportSettings;

/// Root profiler configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Any query slower than this many seconds is flagged as slow in reports
    pub slow_query_threshold: f64,

    /// Number of slowest queries listed in a report
    pub top_slowest: usize,

    /// Number of rows shown in each per-table rollup
    pub top_tables: usize,

    /// HTTP request middleware settings
    pub request: RequestProfilingConfig,

    /// Background task hook settings
    pub task: TaskProfilingConfig,

    /// Repeated statement detection settings
    pub n_plus_one: NPlusOneConfig,
}

/// Request middleware configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestProfilingConfig {
    /// Requests faster than this many seconds are not reported at all
    pub slow_request_threshold: f64,

    /// Per-query threshold used by the request summary lines
    pub slow_query_threshold: f64,
}

/// Task hook configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskProfilingConfig {
    /// Tasks faster than this many seconds are not reported
    pub slow_task_threshold: f64,

    /// Log process memory before and after each task
    pub track_memory: bool,
}

/// N+1 detection configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NPlusOneConfig {
    /// Minimum executions of one statement shape to count as repeated
    pub min_repeats: usize,

    /// Tables whose repeated statements are never reported
    pub ignore_tables: Vec<String>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold: 0.02,
            top_slowest: 5,
            top_tables: 10,
            request: RequestProfilingConfig::default(),
            task: TaskProfilingConfig::default(),
            n_plus_one: NPlusOneConfig::default(),
        }
    }
}

impl Default for RequestProfilingConfig {
    fn default() -> Self {
        Self {
            slow_request_threshold: 0.4,
            slow_query_threshold: 0.1,
        }
    }
}

impl Default for TaskProfilingConfig {
    fn default() -> Self {
        Self {
            slow_task_threshold: 0.0,
            track_memory: true,
        }
    }
}

impl Default for NPlusOneConfig {
    fn default() -> Self {
        Self {
            min_repeats: 3,
            ignore_tables: Vec::new(),
        }
    }
}

impl ProfilerConfig {
    /// Validate thresholds and limits
    pub fn validate(&self) -> ConfigResult<()> {
        let thresholds = [
            ("slow_query_threshold", self.slow_query_threshold),
            (
                "request.slow_request_threshold",
                self.request.slow_request_threshold,
            ),
            (
                "request.slow_query_threshold",
                self.request.slow_query_threshold,
            ),
            ("task.slow_task_threshold", self.task.slow_task_threshold),
        ];

        for (field, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value.to_string(),
                    "threshold must be a non-negative number of seconds",
                ));
            }
        }

        let limits = [
            ("top_slowest", self.top_slowest),
            ("top_tables", self.top_tables),
            ("n_plus_one.min_repeats", self.n_plus_one.min_repeats),
        ];

        for (field, value) in limits {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value.to_string(),
                    "must be at least 1",
                ));
            }
        }

        if self
            .n_plus_one
            .ignore_tables
            .iter()
            .any(|table| table.trim().is_empty())
        {
            return Err(ConfigurationError::validation_error(
                "n_plus_one.ignore_tables must not contain blank table names",
            ));
        }

        Ok(())
    }

    /// Settings consumed by [`crate::report::QueryReport`]
    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            slow_query_threshold: self.slow_query_threshold,
            top_slowest: self.top_slowest,
            top_tables: self.top_tables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ProfilerConfig::default();

        assert_eq!(config.slow_query_threshold, 0.02);
        assert_eq!(config.top_slowest, 5);
        assert_eq!(config.top_tables, 10);
        assert_eq!(config.request.slow_request_threshold, 0.4);
        assert_eq!(config.request.slow_query_threshold, 0.1);
        assert_eq!(config.task.slow_task_threshold, 0.0);
        assert!(config.task.track_memory);
        assert_eq!(config.n_plus_one.min_repeats, 3);
        assert!(config.n_plus_one.ignore_tables.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let mut config = ProfilerConfig::default();
        config.request.slow_request_threshold = -1.0;

        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("request.slow_request_threshold"));
    }

    #[test]
    fn non_finite_threshold_is_rejected() {
        let config = ProfilerConfig {
            slow_query_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = ProfilerConfig {
            top_tables: 0,
            ..Default::default()
        };

        let error = config.validate().unwrap_err();
        assert!(matches!(error, ConfigurationError::InvalidValue { ref field, .. } if field == "top_tables"));
    }

    #[test]
    fn blank_ignored_table_is_rejected() {
        let mut config = ProfilerConfig::default();
        config.n_plus_one.ignore_tables = vec!["django_session".to_string(), " ".to_string()];

        let error = config.validate().unwrap_err();
        assert!(matches!(error, ConfigurationError::ValidationError { .. }));
    }

    #[test]
    fn report_settings_follow_config() {
        let config = ProfilerConfig {
            slow_query_threshold: 0.5,
            top_slowest: 3,
            top_tables: 7,
            ..Default::default()
        };

        let settings = config.report_settings();
        assert_eq!(settings.slow_query_threshold, 0.5);
        assert_eq!(settings.top_slowest, 3);
        assert_eq!(settings.top_tables, 7);
    }
}
