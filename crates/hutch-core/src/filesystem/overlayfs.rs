//! `OverlayFS` locations for a container's writable root.
//!
//! The executor mounts `lowerdir=<rootfs>,upperdir=<upper>,workdir=<work>`
//! on the merged mount point; all three live under a shared base directory
//! and are named after the container's hostname.

use std::path::{Path, PathBuf};

use hutch_common::error::{HutchError, Result};

/// The three overlay locations derived from a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayPaths {
    /// Final merged mount point the container chroots into.
    pub merged_dir: PathBuf,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`.
    pub work_dir: PathBuf,
}

impl OverlayPaths {
    /// Derives the overlay paths for `hostname` under `base`.
    #[must_use]
    pub fn for_hostname(base: &Path, hostname: &str) -> Self {
        Self {
            merged_dir: base.join(format!("{hostname}-merged")),
            upper_dir: base.join(format!("{hostname}-upper")),
            work_dir: base.join(format!("{hostname}-work")),
        }
    }
}

/// Unmounts the overlay at `merged_dir`.
///
/// With `lazy` set, uses `MNT_DETACH` so a busy mount is released once
/// its last user goes away. Returns `Ok(false)` when nothing was mounted
/// there (or the directory is gone).
///
/// # Errors
///
/// Returns [`HutchError::PermissionDenied`] without the privilege to
/// unmount, or an I/O error for any other failure.
pub fn unmount_overlay(merged_dir: &Path, lazy: bool) -> Result<bool> {
    use nix::errno::Errno;
    use nix::mount::{MntFlags, umount2};

    if !is_mount_point(merged_dir) {
        return Ok(false);
    }
    let flags = if lazy {
        MntFlags::MNT_DETACH
    } else {
        MntFlags::empty()
    };
    match umount2(merged_dir, flags) {
        Ok(()) => {
            tracing::info!(path = %merged_dir.display(), lazy, "overlayfs unmounted");
            Ok(true)
        }
        Err(Errno::EINVAL | Errno::ENOENT) => Ok(false),
        Err(Errno::EPERM) => Err(HutchError::PermissionDenied {
            message: format!("unmounting {} requires root", merged_dir.display()),
        }),
        Err(errno) => Err(HutchError::io(
            merged_dir,
            std::io::Error::from_raw_os_error(errno as i32),
        )),
    }
}

/// Whether `path` is the root of a filesystem other than its parent's.
///
/// A missing path is not a mount point.
fn is_mount_point(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(own) = std::fs::symlink_metadata(path) else {
        return false;
    };
    let parent = path.parent().unwrap_or_else(|| Path::new("/"));
    std::fs::metadata(parent).map_or(true, |parent| parent.dev() != own.dev())
}

/// Recursively removes an overlay directory if it exists.
///
/// Returns `Ok(false)` when there was nothing to remove.
///
/// # Errors
///
/// Returns an I/O error if the directory exists but cannot be removed.
pub fn remove_overlay_dir(path: &Path) -> Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "overlay directory removed");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(HutchError::io(path, e)),
    }
}

/// Removes the (empty) merged mount point directory.
///
/// Non-recursive, so a mount that is still attached is never traversed.
/// Returns `Ok(false)` when the directory does not exist.
///
/// # Errors
///
/// Returns an I/O error if the directory exists but cannot be removed,
/// for instance because it is still a busy mount point.
pub fn remove_mount_point(merged_dir: &Path) -> Result<bool> {
    match std::fs::remove_dir(merged_dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(HutchError::io(merged_dir, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_named_after_hostname() {
        let paths = OverlayPaths::for_hostname(Path::new("/tmp"), "cont-abc123def456");
        assert_eq!(paths.merged_dir, Path::new("/tmp/cont-abc123def456-merged"));
        assert_eq!(paths.upper_dir, Path::new("/tmp/cont-abc123def456-upper"));
        assert_eq!(paths.work_dir, Path::new("/tmp/cont-abc123def456-work"));
    }

    #[test]
    fn unmount_of_missing_mount_point_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("cont-x-merged");
        assert!(!unmount_overlay(&gone, false).unwrap());
        assert!(!unmount_overlay(&gone, true).unwrap());
    }

    #[test]
    fn unmount_of_plain_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let merged = dir.path().join("cont-x-merged");
        std::fs::create_dir(&merged).unwrap();
        assert!(!unmount_overlay(&merged, false).unwrap());
        assert!(merged.exists());
    }

    #[test]
    fn remove_overlay_dir_deletes_contents() {
        let dir = tempfile::tempdir().unwrap();
        let upper = dir.path().join("cont-x-upper");
        std::fs::create_dir_all(upper.join("etc")).unwrap();
        std::fs::write(upper.join("etc/hosts"), "127.0.0.1 localhost").unwrap();

        assert!(remove_overlay_dir(&upper).unwrap());
        assert!(!upper.exists());
        assert!(!remove_overlay_dir(&upper).unwrap());
    }

    #[test]
    fn remove_mount_point_never_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let merged = dir.path().join("cont-x-merged");
        std::fs::create_dir_all(merged.join("bin")).unwrap();

        assert!(remove_mount_point(&merged).is_err());
        assert!(merged.join("bin").exists());

        std::fs::remove_dir(merged.join("bin")).unwrap();
        assert!(remove_mount_point(&merged).unwrap());
        assert!(!remove_mount_point(&merged).unwrap());
    }
}
