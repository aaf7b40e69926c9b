//! # hutch-core
//!
//! Host-side primitives the supervisor needs around the containers the
//! executor builds:
//! - **Cgroups v2**: per-pid leaf paths, memory/CPU accounting readers,
//!   and leaf removal.
//! - **Filesystem**: deterministic `OverlayFS` paths and unmounting.
//!
//! Namespace creation, limit enforcement, and mounting are the executor's
//! job; nothing here creates kernel objects.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod filesystem;
