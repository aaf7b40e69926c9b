//! Cgroups v2 accounting for executor-created leaves.
//!
//! The executor places each container's init process in a leaf named by
//! its PID under a shared base directory. The supervisor only reads the
//! accounting files there and removes the leaf during teardown.

pub mod cpu;
pub mod memory;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use hutch_common::error::{HutchError, Result};

/// Returns the leaf directory for the process `pid` under `base`.
#[must_use]
pub fn leaf_path(base: &Path, pid: u32) -> PathBuf {
    base.join(pid.to_string())
}

/// Live accounting read from a cgroup leaf, surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupStats {
    /// Bytes currently charged, from `memory.current`.
    pub memory_current: u64,
    /// Ceiling from `memory.max` (`max` when unlimited).
    pub memory_max: String,
    /// Contents of `cpu.stat`.
    pub cpu_stat: String,
}

/// Reads memory and CPU accounting for a leaf.
///
/// Returns `Ok(None)` when any of the accounting files is absent, which
/// is how a leaf of an exited process (or a missing controller) looks.
///
/// # Errors
///
/// Returns an error if a file exists but cannot be read or parsed.
pub fn read_stats(leaf: &Path) -> Result<Option<CgroupStats>> {
    let Some(memory_current) = memory::read_memory_current(leaf)? else {
        return Ok(None);
    };
    let Some(memory_max) = memory::read_memory_max(leaf)? else {
        return Ok(None);
    };
    let Some(cpu_stat) = cpu::read_cpu_stat(leaf)? else {
        return Ok(None);
    };
    Ok(Some(CgroupStats {
        memory_current,
        memory_max,
        cpu_stat,
    }))
}

/// Removes an (empty) cgroup leaf directory.
///
/// Cgroup directories are removed with `rmdir`; the kernel refuses while
/// processes remain. Returns `Ok(false)` when the leaf does not exist.
///
/// # Errors
///
/// Returns [`HutchError::PermissionDenied`] without the privilege to
/// remove it, or an I/O error for any other failure.
pub fn remove_leaf(leaf: &Path) -> Result<bool> {
    match std::fs::remove_dir(leaf) {
        Ok(()) => {
            tracing::info!(path = %leaf.display(), "cgroup leaf removed");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(HutchError::PermissionDenied {
            message: format!("removing cgroup {}: {e}", leaf.display()),
        }),
        Err(e) => Err(HutchError::io(leaf, e)),
    }
}

/// Reads a control file, trimming trailing whitespace.
fn read_control_file(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw.trim_end().to_string())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HutchError::io(path, e)),
    }
}
