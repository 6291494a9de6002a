use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
#[cfg(target_os = "linux")]
use std::sync::OnceLock;
use sysinfo::{Pid, System};

pub const MB: u64 = 1024 * 1024;

/// Values above this are treated as "no cgroup limit" (1 EiB).
const UNLIMITED_THRESHOLD_BYTES: u64 = 1 << 60;

/// Raw byte counters read from the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMemory {
    /// Upper bound the process may grow to.
    pub limit_bytes: u64,
    /// Address space currently committed by the process.
    pub committed_bytes: u64,
    /// Resident memory currently used by the process.
    pub used_bytes: u64,
}

/// Source of host memory counters.
pub trait MemorySampler: Send + Sync {
    fn sample(&self) -> RawMemory;
}

/// [`MemorySampler`] backed by `sysinfo`, honoring a cgroup memory limit when one is set.
pub struct SystemMemorySampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemMemorySampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                tracing::debug!(
                    target: "ocms.memory",
                    error = err,
                    "failed to determine current pid; process usage reads as zero"
                );
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl Default for SystemMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SystemMemorySampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMemorySampler")
            .field("pid", &self.pid)
            .finish()
    }
}

impl MemorySampler for SystemMemorySampler {
    fn sample(&self) -> RawMemory {
        let mut system = self.system.lock();
        system.refresh_memory();
        let physical = system.total_memory();
        let limit_bytes = match cgroup_memory_limit_bytes() {
            Some(limit) if physical > 0 => limit.min(physical),
            Some(limit) => limit,
            None => physical,
        };

        let (used_bytes, committed_bytes) = match self.pid {
            Some(pid) if system.refresh_process(pid) => system
                .process(pid)
                .map(|process| (process.memory(), process.virtual_memory()))
                .unwrap_or_default(),
            _ => (0, 0),
        };

        RawMemory {
            limit_bytes,
            committed_bytes: committed_bytes.min(limit_bytes).max(used_bytes),
            used_bytes,
        }
    }
}

/// Parse a cgroup memory limit file (`memory.max` or `memory.limit_in_bytes`).
///
/// Returns `None` for `max`, empty, unparsable or effectively unlimited values.
pub fn parse_cgroup_memory_limit(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "max" {
        return None;
    }
    let value = raw.parse::<u64>().ok()?;
    (value < UNLIMITED_THRESHOLD_BYTES).then_some(value)
}

fn cgroup_memory_limit_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        static LIMIT: OnceLock<Option<u64>> = OnceLock::new();
        *LIMIT.get_or_init(|| {
            [
                "/sys/fs/cgroup/memory.max",
                "/sys/fs/cgroup/memory/memory.limit_in_bytes",
            ]
            .into_iter()
            .find_map(|path| match std::fs::read_to_string(path) {
                Ok(raw) => parse_cgroup_memory_limit(&raw),
                Err(err) => {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        tracing::debug!(
                            target: "ocms.memory",
                            path,
                            error = %err,
                            "failed to read cgroup memory limit"
                        );
                    }
                    None
                }
            })
        })
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Snapshot of memory usage in megabytes.
///
/// `used_memory_mb + free_memory_mb == max_memory_mb` holds for every sampled status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStatus {
    pub max_memory_mb: u64,
    pub total_memory_mb: u64,
    pub used_memory_mb: u64,
    pub free_memory_mb: u64,
    pub usage_percent: u64,
    /// Number of samples folded into this status by [`MemoryStatus::calculate_average`].
    pub sample_count: u64,
}

impl MemoryStatus {
    pub fn from_raw(raw: RawMemory) -> Self {
        let max_memory_mb = raw.limit_bytes / MB;
        let used_memory_mb = (raw.used_bytes / MB).min(max_memory_mb);
        let total_memory_mb = (raw.committed_bytes / MB).min(max_memory_mb);
        let free_memory_mb = max_memory_mb - used_memory_mb;
        let usage_percent = if max_memory_mb == 0 {
            0
        } else {
            used_memory_mb * 100 / max_memory_mb
        };
        Self {
            max_memory_mb,
            total_memory_mb,
            used_memory_mb,
            free_memory_mb,
            usage_percent,
            sample_count: 0,
        }
    }

    /// Re-read the host counters, overwriting the current values in place.
    pub fn update(&mut self, sampler: &dyn MemorySampler) {
        let sample_count = self.sample_count;
        *self = Self::from_raw(sampler.sample());
        self.sample_count = sample_count;
    }

    /// Fold `current` into this running average: `avg = (avg * n + new) / (n + 1)`.
    pub fn calculate_average(&mut self, current: &MemoryStatus) {
        let n = self.sample_count;
        let fold = |avg: u64, new: u64| -> u64 {
            let sum = u128::from(avg) * u128::from(n) + u128::from(new);
            (sum / u128::from(n + 1)) as u64
        };
        self.max_memory_mb = fold(self.max_memory_mb, current.max_memory_mb);
        self.total_memory_mb = fold(self.total_memory_mb, current.total_memory_mb);
        self.used_memory_mb = fold(self.used_memory_mb, current.used_memory_mb);
        self.free_memory_mb = fold(self.free_memory_mb, current.free_memory_mb);
        self.usage_percent = fold(self.usage_percent, current.usage_percent);
        self.sample_count = n + 1;
    }
}
