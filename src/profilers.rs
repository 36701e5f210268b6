//! # Function Profilers
//!
//! Wrappers that profile a single closure: time it and report its statements,
//! count its statements, or log process memory around it. With the
//! `cpu-profiling` feature, [`cpu::cpu_profile`] samples the CPU while the
//! closure runs.

use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::config::ProfilerConfig;
use crate::memory::{format_size, MemorySampler};
use crate::query_log::QueryLog;
use crate::report::{report_with, shared_console_sink, QueryReport, SharedSink};

pub struct FunctionProfiler {
    config: Arc<ProfilerConfig>,
    memory: MemorySampler,
    sink: SharedSink,
}

impl Default for FunctionProfiler {
    fn default() -> Self {
        Self::new(Arc::new(ProfilerConfig::default()))
    }
}

impl FunctionProfiler {
    pub fn new(config: Arc<ProfilerConfig>) -> Self {
        Self::with_sink(config, shared_console_sink())
    }

    pub fn with_sink(config: Arc<ProfilerConfig>, sink: SharedSink) -> Self {
        Self {
            config,
            memory: MemorySampler::new(),
            sink,
        }
    }

    /// Run `f` against a freshly reset `log`, log its wall time, and report
    /// its statements under `name`
    pub fn time_queries<F, T>(&self, name: &str, log: &QueryLog, f: F) -> (T, QueryReport)
    where
        F: FnOnce(&QueryLog) -> T,
    {
        log.reset();
        let started = Instant::now();
        let output = f(log);
        warn!(function = %name, "fn time: {}", started.elapsed().as_secs_f64());

        let mut sink = self.sink.lock();
        let query_report = report_with(
            name,
            &log.snapshot(),
            &self.config.report_settings(),
            &mut *sink,
        );
        (output, query_report)
    }

    /// Run `f` against a freshly reset `log` and log every statement it executed.
    /// Returns the output and the number of statements.
    pub fn count_queries<F, T>(&self, log: &QueryLog, f: F) -> (T, usize)
    where
        F: FnOnce(&QueryLog) -> T,
    {
        log.reset();
        let output = f(log);
        (output, log_queries(log))
    }

    /// Log process memory before and after `f`
    pub fn track_memory<F, T>(&self, label: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let before = self.memory.current_usage();
        if let Some(bytes) = before {
            warn!(label = %label, "Total Heap Size before: {}", format_size(bytes));
        }

        let output = f();

        // Without a first sample there is nothing to compare against
        if before.is_some() {
            if let Some(bytes) = self.memory.current_usage() {
                warn!(label = %label, "Total Heap Size after: {}", format_size(bytes));
            }
        }
        output
    }
}

/// Log each statement in `log` followed by the count. Returns the count.
pub fn log_queries(log: &QueryLog) -> usize {
    let records = log.snapshot();
    for record in &records {
        warn!(
            sql = %record.sql,
            elapsed_seconds = record.elapsed_seconds,
            "Executed query"
        );
    }
    warn!(count = records.len(), "{} queries", records.len());
    records.len()
}

#[cfg(feature = "cpu-profiling")]
pub mod cpu {
    //! Sampling CPU profiler around a closure.

    use std::fs::File;
    use std::path::PathBuf;
    use tracing::{error, info, warn};

    use crate::error::{ProfilerError, Result};

    #[derive(Debug, Clone)]
    pub struct CpuProfileOptions {
        /// Samples per second
        pub frequency: i32,
        /// How many times to run the closure while sampling
        pub iterations: usize,
        /// Number of hottest stacks to log
        pub top: usize,
        /// Where to write a flamegraph SVG
        pub flamegraph: Option<PathBuf>,
    }

    impl Default for CpuProfileOptions {
        fn default() -> Self {
            Self {
                frequency: 1000,
                iterations: 1,
                top: 20,
                flamegraph: Some(PathBuf::from("profile.svg")),
            }
        }
    }

    /// Run `f` `options.iterations` times (at least once) under the sampling
    /// profiler and return the last output. Profiler failures are logged only.
    pub fn cpu_profile<F, T>(options: &CpuProfileOptions, mut f: F) -> T
    where
        F: FnMut() -> T,
    {
        let guard = match pprof::ProfilerGuardBuilder::default()
            .frequency(options.frequency)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
        {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(error = %e, "CPU profiler unavailable, running without it");
                None
            }
        };

        let mut output = f();
        for _ in 1..options.iterations {
            output = f();
        }

        if let Some(guard) = guard {
            if let Err(e) = write_profile(&guard, options) {
                error!(error = %e, "Failed to build CPU profile");
            }
        }
        output
    }

    fn write_profile(guard: &pprof::ProfilerGuard<'_>, options: &CpuProfileOptions) -> Result<()> {
        let report = guard.report().build().map_err(ProfilerError::profiling)?;

        let mut stacks: Vec<(&pprof::Frames, &isize)> = report.data.iter().collect();
        stacks.sort_by(|a, b| b.1.cmp(a.1));
        for (frames, samples) in stacks.into_iter().take(options.top) {
            let leaf = frames
                .frames
                .first()
                .and_then(|symbols| symbols.first())
                .map(|symbol| symbol.name())
                .unwrap_or_else(|| "<unknown>".to_string());
            info!(samples = *samples, thread = %frames.thread_name, "{leaf}");
        }

        if let Some(path) = &options.flamegraph {
            let file = File::create(path)?;
            report.flamegraph(file).map_err(ProfilerError::profiling)?;
            info!(path = %path.display(), "Wrote CPU flamegraph");
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_log::QueryRecord;
    use crate::report::MemorySink;
    use parking_lot::Mutex;

    fn profiler() -> (FunctionProfiler, Arc<Mutex<MemorySink>>) {
        let memory = Arc::new(Mutex::new(MemorySink::new()));
        let sink: SharedSink = memory.clone();
        (
            FunctionProfiler::with_sink(Arc::new(ProfilerConfig::default()), sink),
            memory,
        )
    }

    #[test]
    fn time_queries_reports_only_statements_from_the_closure() {
        let (profiler, memory) = profiler();
        let log = QueryLog::new();
        log.push(QueryRecord::new("left over from a previous call", 1.0));

        let (output, report) = profiler.time_queries("load_dashboard", &log, |log| {
            log.push(QueryRecord::new(r#"SELECT * FROM "widgets""#, 0.04));
            log.push(QueryRecord::new(r#"SELECT * FROM "widgets""#, 0.01));
            "rendered"
        });

        assert_eq!(output, "rendered");
        assert_eq!(report.total_count, 2);
        assert_eq!(report.counts_per_table[0].table, "widgets");
        assert_eq!(memory.lock().lines().next(), Some("load_dashboard"));
    }

    #[test]
    fn count_queries_counts_fresh_batch() {
        let (profiler, _memory) = profiler();
        let log = QueryLog::new();
        log.push(QueryRecord::new("stale", 0.1));

        let ((), count) = profiler.count_queries(&log, |log| {
            for _ in 0..3 {
                log.push(QueryRecord::new("SELECT 1", 0.0));
            }
        });

        assert_eq!(count, 3);
    }

    #[test]
    fn track_memory_returns_closure_output() {
        let (profiler, _memory) = profiler();
        let buffer = profiler.track_memory("allocate", || vec![0u8; 4096]);
        assert_eq!(buffer.len(), 4096);
    }

    #[test]
    fn log_queries_returns_batch_size() {
        let log = QueryLog::new();
        assert_eq!(log_queries(&log), 0);
        log.push(QueryRecord::new("SELECT 1", 0.0));
        assert_eq!(log_queries(&log), 1);
    }
}
