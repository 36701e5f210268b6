//! # Profiler Errors
//!
//! Error taxonomy for the profiling toolkit. Reporting sits on a cross-cutting
//! observability path, so most of these never reach the caller of a request or
//! task: they are logged at the point where a report is emitted and dropped.

use thiserror::Error;

use crate::config::ConfigurationError;

#[derive(Debug, Error)]
pub enum ProfilerError {
    /// The report sink could not accept output
    #[error("Report sink error: {0}")]
    Sink(String),

    /// Configuration could not be loaded or failed validation
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The CPU profiler failed to start or to build its report
    #[error("Profiling error: {0}")]
    Profiling(String),
}

impl ProfilerError {
    pub fn sink<E: std::fmt::Display>(error: E) -> Self {
        Self::Sink(error.to_string())
    }

    pub fn profiling<E: std::fmt::Display>(error: E) -> Self {
        Self::Profiling(error.to_string())
    }
}

impl From<std::io::Error> for ProfilerError {
    fn from(error: std::io::Error) -> Self {
        Self::Sink(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
