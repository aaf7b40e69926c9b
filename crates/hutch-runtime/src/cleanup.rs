//! Teardown of a removed container's derived resources.
//!
//! Steps run in a fixed order and each one runs regardless of how the
//! previous ones went; every outcome is collected into a report. Deleting
//! the record directory comes last and is the only externally visible
//! commit point.

use std::fmt;
use std::path::{Path, PathBuf};

use hutch_common::error::Result;
use hutch_common::types::ContainerId;
use hutch_core::cgroup;
use hutch_core::filesystem::overlayfs::{self, OverlayPaths};

use crate::state::{ContainerRecord, RecordStore};

/// What happened to a single teardown step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step changed something.
    Done,
    /// There was nothing to do.
    Skipped,
    /// The step failed; later steps still ran.
    Failed(String),
}

/// One teardown step and its outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupStep {
    /// Short description of the action.
    pub action: &'static str,
    /// Path the action applied to.
    pub target: PathBuf,
    /// What happened.
    pub outcome: StepOutcome,
}

impl fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.target.display())?;
        match &self.outcome {
            StepOutcome::Done => Ok(()),
            StepOutcome::Skipped => write!(f, " (nothing to do)"),
            StepOutcome::Failed(reason) => write!(f, " failed: {reason}"),
        }
    }
}

/// Aggregate outcome of a teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Container the teardown belonged to.
    pub id: ContainerId,
    /// Steps in the order they ran.
    pub steps: Vec<CleanupStep>,
}

impl CleanupReport {
    /// Whether every step succeeded or had nothing to do.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|step| !matches!(step.outcome, StepOutcome::Failed(_)))
    }

    /// One line per failed step.
    #[must_use]
    pub fn failures(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|step| matches!(step.outcome, StepOutcome::Failed(_)))
            .map(ToString::to_string)
            .collect()
    }
}

/// Tears down everything derived from `record`, then the record itself.
///
/// Order: cgroup leaf, overlay unmount, upper and work directories, a
/// second (lazy) unmount, the mount point, and the record directory.
pub fn teardown(
    record: &ContainerRecord,
    store: &RecordStore,
    cgroup_base: &Path,
    overlay_base: &Path,
) -> CleanupReport {
    let mut steps = Vec::new();

    if let Some(pid) = record.pid {
        let leaf = cgroup::leaf_path(cgroup_base, pid);
        steps.push(run_step("remove cgroup", leaf, cgroup::remove_leaf));
    }

    if record.hostname.is_empty() {
        tracing::warn!(id = %record.id, "record has no hostname; skipping overlay cleanup");
    } else {
        let overlay = OverlayPaths::for_hostname(overlay_base, &record.hostname);
        steps.push(run_step("unmount", overlay.merged_dir.clone(), |p| {
            overlayfs::unmount_overlay(p, false)
        }));
        steps.push(run_step(
            "remove upper dir",
            overlay.upper_dir,
            overlayfs::remove_overlay_dir,
        ));
        steps.push(run_step(
            "remove work dir",
            overlay.work_dir,
            overlayfs::remove_overlay_dir,
        ));
        steps.push(run_step("unmount again", overlay.merged_dir.clone(), |p| {
            overlayfs::unmount_overlay(p, true)
        }));
        steps.push(run_step(
            "remove mount point",
            overlay.merged_dir,
            overlayfs::remove_mount_point,
        ));
    }

    steps.push(run_step(
        "remove container data",
        store.record_dir(&record.id),
        |_| store.remove(&record.id).map(|()| true),
    ));

    CleanupReport {
        id: record.id.clone(),
        steps,
    }
}

fn run_step<F>(action: &'static str, target: PathBuf, step: F) -> CleanupStep
where
    F: FnOnce(&Path) -> Result<bool>,
{
    let outcome = match step(&target) {
        Ok(true) => StepOutcome::Done,
        Ok(false) => StepOutcome::Skipped,
        Err(e) => {
            tracing::warn!(action, target = %target.display(), error = %e, "cleanup step failed");
            StepOutcome::Failed(e.to_string())
        }
    };
    CleanupStep {
        action,
        target,
        outcome,
    }
}
