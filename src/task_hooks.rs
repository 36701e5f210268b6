//! # Task Hooks
//!
//! Before/after hooks for background task execution. [`TaskProfiler::prerun`]
//! opens a fresh query batch and samples process memory; [`TaskProfiler::postrun`]
//! reports the batch under the task name and samples memory again.
//!
//! Task runners that expose pre/post signals call the two hooks directly;
//! otherwise [`TaskProfiler::run`] and [`TaskProfiler::run_async`] wrap a
//! whole task body.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ProfilerConfig;
use crate::logging::log_unit_of_work;
use crate::memory::{format_sample, MemorySampler};
use crate::query_log::QueryLog;
use crate::report::{report_with, shared_console_sink, SharedSink};

/// In-flight task execution returned by [`TaskProfiler::prerun`]
#[derive(Debug)]
pub struct TaskRun {
    task_id: Uuid,
    task_name: String,
    query_log: QueryLog,
    started: Instant,
    memory_before: Option<u64>,
}

impl TaskRun {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// The batch the task body records its statements into
    pub fn query_log(&self) -> &QueryLog {
        &self.query_log
    }

    pub fn memory_before(&self) -> Option<u64> {
        self.memory_before
    }
}

/// What [`TaskProfiler::postrun`] observed
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task_name: String,
    pub elapsed: Duration,
    pub query_count: usize,
    pub reported: bool,
    pub memory_before: Option<u64>,
    pub memory_after: Option<u64>,
}

pub struct TaskProfiler {
    config: Arc<ProfilerConfig>,
    memory: MemorySampler,
    sink: SharedSink,
}

impl std::fmt::Debug for TaskProfiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProfiler")
            .field("config", &self.config)
            .field("memory", &self.memory)
            .finish()
    }
}

impl Default for TaskProfiler {
    fn default() -> Self {
        Self::new(Arc::new(ProfilerConfig::default()))
    }
}

impl TaskProfiler {
    /// Report to the console
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

    fn sample_memory(&self) -> Option<u64> {
        if self.config.task.track_memory {
            self.memory.current_usage()
        } else {
            None
        }
    }

    pub fn prerun(&self, task_name: impl Into<String>) -> TaskRun {
        let task_name = task_name.into();
        let task_id = Uuid::new_v4();
        debug!(task_id = %task_id, task_name = %task_name, "Task starting");

        let memory_before = self.sample_memory();
        if self.config.task.track_memory {
            warn!(task_name = %task_name, "MEM BEFORE: {}", format_sample(memory_before));
        }

        TaskRun {
            task_id,
            task_name,
            query_log: QueryLog::new(),
            started: Instant::now(),
            memory_before,
        }
    }

    pub fn postrun(&self, run: TaskRun) -> TaskOutcome {
        let elapsed = run.started.elapsed();
        self.complete(run, elapsed)
    }

    /// Finish `run` with an externally measured duration
    pub fn complete(&self, run: TaskRun, elapsed: Duration) -> TaskOutcome {
        let records = run.query_log.snapshot();
        let reported = elapsed.as_secs_f64() >= self.config.task.slow_task_threshold;

        if reported {
            let span = tracing::warn_span!("slow_task", task_id = %run.task_id);
            let _entered = span.enter();
            let mut sink = self.sink.lock();
            report_with(
                &run.task_name,
                &records,
                &self.config.report_settings(),
                &mut *sink,
            );
        }

        let memory_after = self.sample_memory();
        if self.config.task.track_memory {
            warn!(task_name = %run.task_name, "MEM AFTER: {}", format_sample(memory_after));
        }

        log_unit_of_work("task", &run.task_name, elapsed, records.len(), reported);

        TaskOutcome {
            task_name: run.task_name,
            elapsed,
            query_count: records.len(),
            reported,
            memory_before: run.memory_before,
            memory_after,
        }
    }

    /// Run a synchronous task body between the hooks
    pub fn run<F, T>(&self, task_name: impl Into<String>, body: F) -> T
    where
        F: FnOnce(&QueryLog) -> T,
    {
        let run = self.prerun(task_name);
        let output = body(run.query_log());
        self.postrun(run);
        output
    }

    /// Run an async task body between the hooks
    pub async fn run_async<F, Fut, T>(&self, task_name: impl Into<String>, body: F) -> T
    where
        F: FnOnce(QueryLog) -> Fut,
        Fut: Future<Output = T>,
    {
        let run = self.prerun(task_name);
        let output = body(run.query_log().clone()).await;
        self.postrun(run);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaskProfilingConfig;
    use crate::query_log::QueryRecord;
    use crate::report::MemorySink;
    use parking_lot::Mutex;

    fn profiler(task: TaskProfilingConfig) -> (TaskProfiler, Arc<Mutex<MemorySink>>) {
        let memory = Arc::new(Mutex::new(MemorySink::new()));
        let sink: SharedSink = memory.clone();
        let config = ProfilerConfig {
            task,
            ..Default::default()
        };
        (TaskProfiler::with_sink(Arc::new(config), sink), memory)
    }

    #[test]
    fn default_gate_reports_every_task() {
        let (profiler, memory) = profiler(TaskProfilingConfig::default());

        let run = profiler.prerun("send_welcome_email");
        run.query_log()
            .push(QueryRecord::new(r#"SELECT * FROM "users""#, 0.03));
        let outcome = profiler.complete(run, Duration::ZERO);

        assert!(outcome.reported);
        assert_eq!(outcome.query_count, 1);
        let memory = memory.lock();
        assert_eq!(memory.lines().next(), Some("send_welcome_email"));
        assert_eq!(
            memory.blocks().last(),
            Some("1 Queries - Total time: 0.03 (sec)")
        );
    }

    #[test]
    fn fast_tasks_below_gate_are_not_reported() {
        let (profiler, memory) = profiler(TaskProfilingConfig {
            slow_task_threshold: 5.0,
            track_memory: false,
        });

        let run = profiler.prerun("cleanup");
        let outcome = profiler.complete(run, Duration::from_secs(1));

        assert!(!outcome.reported);
        assert!(outcome.memory_before.is_none());
        assert!(outcome.memory_after.is_none());
        assert!(memory.lock().entries.is_empty());
    }

    #[test]
    fn each_run_gets_its_own_batch() {
        let (profiler, _memory) = profiler(TaskProfilingConfig::default());

        let first = profiler.prerun("first");
        let second = profiler.prerun("second");
        first.query_log().push(QueryRecord::new("SELECT 1", 0.001));

        assert_eq!(first.query_log().len(), 1);
        assert!(second.query_log().is_empty());
        assert_ne!(first.task_id(), second.task_id());
    }

    #[test]
    fn run_returns_body_output() {
        let (profiler, memory) = profiler(TaskProfilingConfig::default());

        let total = profiler.run("sum_orders", |log| {
            log.push(QueryRecord::new(r#"SELECT SUM("total") FROM "orders""#, 0.01));
            250
        });

        assert_eq!(total, 250);
        assert_eq!(memory.lock().lines().next(), Some("sum_orders"));
    }

    #[tokio::test]
    async fn run_async_reports_statements_recorded_by_the_future() {
        let (profiler, memory) = profiler(TaskProfilingConfig::default());

        let rows = profiler
            .run_async("sync_inventory", |log| async move {
                log.track(r#"SELECT * FROM "items""#, async { 3 }).await
            })
            .await;

        assert_eq!(rows, 3);
        let memory = memory.lock();
        assert!(memory
            .blocks()
            .any(|block| block.starts_with("1 Queries - Total time:")));
    }
}
