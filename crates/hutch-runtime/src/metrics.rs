//! Live resource accounting for running containers.
//!
//! Reads the cgroup v2 files of the leaf the executor created for a
//! container's init process.

use std::path::Path;

use hutch_common::error::Result;
use hutch_common::types::ContainerStatus;
use hutch_core::cgroup::{self, CgroupStats};

use crate::state::ContainerRecord;

/// What `status` knows about one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// The record as stored.
    pub record: ContainerRecord,
    /// Whether the recorded PID belongs to a live process.
    pub alive: bool,
    /// Accounting for the live process; `None` when unavailable.
    pub stats: Option<CgroupStats>,
}

/// Collects a metrics snapshot for the process `pid`.
///
/// Returns `Ok(None)` when the accounting files do not exist.
///
/// # Errors
///
/// Returns an error if the files exist but cannot be read.
pub fn collect_metrics(cgroup_base: &Path, pid: u32) -> Result<Option<CgroupStats>> {
    let leaf = cgroup::leaf_path(cgroup_base, pid);
    tracing::debug!(pid, leaf = %leaf.display(), "collecting metrics");
    cgroup::read_stats(&leaf)
}

/// Builds the status report for `record`.
///
/// Stats are only read for a `running` record whose process is alive.
/// Accounting that cannot be read is reported as unavailable.
#[must_use]
pub fn inspect(record: ContainerRecord, cgroup_base: &Path) -> StatusReport {
    let live_pid = record.pid.filter(|pid| crate::process::is_alive(*pid));
    let stats = match live_pid.filter(|_| record.status == ContainerStatus::Running) {
        Some(pid) => collect_metrics(cgroup_base, pid).unwrap_or_else(|e| {
            tracing::warn!(id = %record.id, pid, error = %e, "accounting unreadable");
            None
        }),
        None => None,
    };
    StatusReport {
        alive: live_pid.is_some(),
        record,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use hutch_common::types::{ContainerId, ResourceLimits};

    use super::*;

    fn record(status: ContainerStatus, pid: u32) -> ContainerRecord {
        let mut record = ContainerRecord::new(
            ContainerId::new("abc123def456"),
            "/img/alpine".into(),
            ResourceLimits::default(),
        );
        record.status = status;
        record.pid = Some(pid);
        record
    }

    fn running(pid: u32) -> ContainerRecord {
        record(ContainerStatus::Running, pid)
    }

    fn write_accounting(base: &Path, pid: u32, memory_current: &str) {
        let leaf = cgroup::leaf_path(base, pid);
        std::fs::create_dir_all(&leaf).unwrap();
        std::fs::write(leaf.join("memory.current"), memory_current).unwrap();
        std::fs::write(leaf.join("memory.max"), "max").unwrap();
        std::fs::write(leaf.join("cpu.stat"), "usage_usec 5").unwrap();
    }

    #[test]
    fn live_process_without_accounting_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let report = inspect(running(std::process::id()), dir.path());
        assert!(report.alive);
        assert!(report.stats.is_none());
    }

    #[test]
    fn live_process_surfaces_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let pid = std::process::id();
        write_accounting(dir.path(), pid, "2048");

        let report = inspect(running(pid), dir.path());
        let stats = report.stats.expect("stats");
        assert_eq!(stats.memory_current, 2048);
        assert_eq!(stats.memory_max, "max");
    }

    #[test]
    fn dead_process_reads_no_stats() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = cgroup::leaf_path(dir.path(), 999_999_999);
        std::fs::create_dir_all(&leaf).unwrap();
        std::fs::write(leaf.join("memory.current"), "garbage").unwrap();

        let report = inspect(running(999_999_999), dir.path());
        assert!(!report.alive);
        assert!(report.stats.is_none());
        assert_eq!(report.record.status, ContainerStatus::Running);
    }

    #[test]
    fn stopped_record_with_recycled_pid_reads_no_stats() {
        let dir = tempfile::tempdir().unwrap();
        let pid = std::process::id();
        write_accounting(dir.path(), pid, "2048");

        for status in [ContainerStatus::Stopped, ContainerStatus::Failed] {
            let report = inspect(record(status, pid), dir.path());
            assert!(report.stats.is_none(), "{status} record surfaced stats");
        }
    }

    #[test]
    fn unreadable_accounting_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let pid = std::process::id();
        write_accounting(dir.path(), pid, "not-a-number");

        let report = inspect(running(pid), dir.path());
        assert!(report.alive);
        assert!(report.stats.is_none());
    }
}
