//! Process memory sampling for before/after comparisons around a unit of work.

use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::debug;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Human-readable size in binary units. Sizes under 1 KB are the bare byte count.
pub fn format_size(bytes: u64) -> String {
    match bytes {
        b if b < KB => b.to_string(),
        b if b < MB => format!("{:.2} KB", b as f64 / KB as f64),
        b if b < GB => format!("{:.2} MB", b as f64 / MB as f64),
        b => format!("{:.2} GB", b as f64 / GB as f64),
    }
}

/// Format an optional sample, for platforms where sampling is unavailable
pub fn format_sample(bytes: Option<u64>) -> String {
    bytes.map(format_size).unwrap_or_else(|| "unavailable".to_string())
}

/// Reads the resident memory of the current process
pub struct MemorySampler {
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl std::fmt::Debug for MemorySampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySampler").field("pid", &self.pid).finish()
    }
}

impl Default for MemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!(error = %e, "Process memory sampling unavailable on this platform");
                None
            }
        };

        Self {
            pid,
            system: Mutex::new(System::new()),
        }
    }

    /// Resident memory in bytes, or `None` when it cannot be read
    pub fn current_usage(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|process| process.memory())
    }
}
