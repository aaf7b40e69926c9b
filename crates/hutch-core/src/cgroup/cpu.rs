//! CPU accounting via cgroups v2.

use std::path::Path;

use hutch_common::error::Result;

/// Reads `cpu.stat` of the leaf verbatim.
///
/// # Errors
///
/// Returns an error if `cpu.stat` exists but cannot be read.
pub fn read_cpu_stat(leaf: &Path) -> Result<Option<String>> {
    super::read_control_file(&leaf.join("cpu.stat"))
}
