use crate::registry::CacheStatistics;
use crate::status::MemoryStatus;
use std::fmt::Write;

/// Multi-line status summary: memory figures followed by one line per cache.
pub fn status_report(
    current: &MemoryStatus,
    average: &MemoryStatus,
    statistics: &[CacheStatistics],
    max_usage_percent: u64,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Memory status");
    write_memory(&mut out, current, average, max_usage_percent);
    let _ = writeln!(out);
    write_caches(&mut out, statistics);
    out
}

/// Like [`status_report`], headed by the threshold that was exceeded.
pub fn warning_report(
    current: &MemoryStatus,
    average: &MemoryStatus,
    statistics: &[CacheStatistics],
    max_usage_percent: u64,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Memory usage of {}% exceeds the configured limit of {}%.",
        current.usage_percent, max_usage_percent
    );
    let _ = writeln!(out);
    out.push_str(&status_report(current, average, statistics, max_usage_percent));
    out
}

fn write_memory(out: &mut String, current: &MemoryStatus, average: &MemoryStatus, limit: u64) {
    let _ = writeln!(out, "  max memory:    {:>8} MB", current.max_memory_mb);
    let _ = writeln!(out, "  total memory:  {:>8} MB", current.total_memory_mb);
    let _ = writeln!(
        out,
        "  used memory:   {:>8} MB ({}%)",
        current.used_memory_mb, current.usage_percent
    );
    let _ = writeln!(out, "  free memory:   {:>8} MB", current.free_memory_mb);
    let _ = writeln!(
        out,
        "  average used:  {:>8} MB ({}%) over {} samples",
        average.used_memory_mb, average.usage_percent, average.sample_count
    );
    let _ = writeln!(out, "  warning limit: {:>8} %", limit);
}

fn write_caches(out: &mut String, statistics: &[CacheStatistics]) {
    let _ = writeln!(
        out,
        "{:<22} {:>10} {:>10} {:>14}",
        "cache", "entries", "limit", "est. bytes"
    );
    let mut total = 0usize;
    for stat in statistics {
        let limit = stat
            .limit
            .map_or_else(|| "-".to_string(), |limit| limit.to_string());
        let _ = writeln!(
            out,
            "{:<22} {:>10} {:>10} {:>14}",
            stat.cache_type.name(),
            stat.entries,
            limit,
            stat.estimated_bytes
        );
        total = total.saturating_add(stat.estimated_bytes);
    }
    let _ = writeln!(out, "total estimated size: {total} bytes");
}
