//! Filesystem management for container teardown.
//!
//! Derives the overlay locations the executor mounts for a container and
//! undoes the mount.

pub mod overlayfs;
