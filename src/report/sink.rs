//! Report output sinks.
//!
//! A report is written as individual log lines plus multi-line blocks (the
//! per-table rollups and the closing summary).

use parking_lot::Mutex;
use std::io::{self, Stdout, Write};
use std::sync::Arc;
use tracing::warn;

use crate::error::{ProfilerError, Result};

const REPORT_TARGET: &str = "tasker_profiler::report";

/// Destination for report output
pub trait ReportSink {
    /// Write a single log line
    fn line(&mut self, line: &str) -> Result<()>;

    /// Write a multi-line block such as a rendered table
    fn block(&mut self, block: &str) -> Result<()>;
}

/// Sink shared between concurrent units of work; emission holds the lock so
/// one report's lines are never interleaved with another's
pub type SharedSink = Arc<Mutex<dyn ReportSink + Send>>;

pub fn shared_console_sink() -> SharedSink {
    Arc::new(Mutex::new(ConsoleSink::stdout()))
}

/// Lines go to the log at WARN; blocks go to a console writer (stdout by default)
/// surrounded by blank lines so tables stay readable next to log output.
pub struct ConsoleSink<W: Write = Stdout> {
    writer: W,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self {
            writer: io::stdout(),
        }
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for ConsoleSink<W> {
    fn line(&mut self, line: &str) -> Result<()> {
        warn!(target: REPORT_TARGET, "{line}");
        Ok(())
    }

    fn block(&mut self, block: &str) -> Result<()> {
        self.writer.write_all(b"\n")?;
        self.writer.write_all(block.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(ProfilerError::from)
    }
}

/// Everything goes through `tracing`, for deployments without a console
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn line(&mut self, line: &str) -> Result<()> {
        warn!(target: REPORT_TARGET, "{line}");
        Ok(())
    }

    fn block(&mut self, block: &str) -> Result<()> {
        warn!(target: REPORT_TARGET, "\n{block}");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEntry {
    Line(String),
    Block(String),
}

impl SinkEntry {
    pub fn text(&self) -> &str {
        match self {
            SinkEntry::Line(text) | SinkEntry::Block(text) => text,
        }
    }
}

/// Keeps output in memory, in emission order
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub entries: Vec<SinkEntry>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match entry {
            SinkEntry::Line(text) => Some(text.as_str()),
            SinkEntry::Block(_) => None,
        })
    }

    pub fn blocks(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match entry {
            SinkEntry::Block(text) => Some(text.as_str()),
            SinkEntry::Line(_) => None,
        })
    }

    /// All output joined with newlines
    pub fn output(&self) -> String {
        self.entries
            .iter()
            .map(SinkEntry::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ReportSink for MemorySink {
    fn line(&mut self, line: &str) -> Result<()> {
        self.entries.push(SinkEntry::Line(line.to_string()));
        Ok(())
    }

    fn block(&mut self, block: &str) -> Result<()> {
        self.entries.push(SinkEntry::Block(block.to_string()));
        Ok(())
    }
}
