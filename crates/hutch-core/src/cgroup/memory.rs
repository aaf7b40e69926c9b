//! Memory accounting via cgroups v2.
//!
//! Reads `memory.current` and `memory.max`.

use std::path::Path;

use hutch_common::error::{HutchError, Result};

/// Reads the bytes currently charged to the leaf.
///
/// # Errors
///
/// Returns an error if `memory.current` exists but is unreadable or not
/// an integer.
pub fn read_memory_current(leaf: &Path) -> Result<Option<u64>> {
    let path = leaf.join("memory.current");
    let Some(raw) = super::read_control_file(&path)? else {
        return Ok(None);
    };
    raw.parse().map(Some).map_err(|e| {
        HutchError::io(
            &path,
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })
}

/// Reads the hard memory ceiling of the leaf as written by the kernel.
///
/// # Errors
///
/// Returns an error if `memory.max` exists but cannot be read.
pub fn read_memory_max(leaf: &Path) -> Result<Option<String>> {
    super::read_control_file(&leaf.join("memory.max"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_memory_current_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("memory.current"), "lots").unwrap();
        assert!(read_memory_current(dir.path()).is_err());
    }

    #[test]
    fn unlimited_memory_max_reads_as_max() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("memory.max"), "max\n").unwrap();
        assert_eq!(read_memory_max(dir.path()).unwrap().as_deref(), Some("max"));
    }
}
