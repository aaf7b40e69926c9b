//! Runtime engine that orchestrates the container lifecycle.
//!
//! Every command resolves a record, drives at most one helper invocation,
//! and persists the outcome before returning. Helper failures never leave
//! a record in a transitional status.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use hutch_common::config::SupervisorConfig;
use hutch_common::error::{HutchError, Result};
use hutch_common::types::{ContainerId, ContainerStatus, ResourceLimits};
use hutch_core::cgroup;
use hutch_core::filesystem::overlayfs::OverlayPaths;

use crate::cleanup::{self, CleanupReport};
use crate::helper::{Helper, Launch};
use crate::metrics::{self, StatusReport};
use crate::process::{self, Termination};
use crate::resolve;
use crate::state::{ContainerRecord, RecordStore};

/// Parameters of a `run` request as supplied by the user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRequest {
    /// Root filesystem source directory.
    pub rootfs: PathBuf,
    /// Memory ceiling, e.g. `100M`; unconstrained when absent.
    pub memory: Option<String>,
    /// Fraction of one CPU, e.g. `0.5`; unconstrained when absent.
    pub cpu: Option<f64>,
}

/// How a `stop` request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// SIGTERM was delivered to the init process.
    Signalled,
    /// No live process was left to signal.
    AlreadyStopped,
}

/// The runtime engine that coordinates all container operations.
#[derive(Debug)]
pub struct Engine {
    config: SupervisorConfig,
    store: RecordStore,
    executor: Helper,
    entry_tool: Helper,
}

impl Engine {
    /// Opens the engine, creating the state directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::PermissionDenied`] if the state directory
    /// cannot be created by the current user.
    pub fn open(config: SupervisorConfig) -> Result<Self> {
        let store = RecordStore::new(&config.state_dir);
        store.ensure_root()?;
        let timeout = config.helper_timeout();
        Ok(Self {
            executor: Helper::new(&config.executor, config.escalation.clone(), timeout),
            entry_tool: Helper::new(&config.entry_tool, config.escalation.clone(), timeout),
            store,
            config,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Returns the record store backing this engine.
    #[must_use]
    pub const fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Creates and launches a new container.
    ///
    /// Executor diagnostics are echoed to `diag` as they arrive. The record
    /// ends `running` on success and `failed` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::InvalidArgument`] for a bad root filesystem or
    /// limit (no record is created), or [`HutchError::HelperFailure`] if the
    /// executor did not hand off a process.
    pub fn run(&self, request: &RunRequest, diag: &mut dyn Write) -> Result<ContainerRecord> {
        let limits = ResourceLimits::from_request(request.memory.as_deref(), request.cpu)?;
        let rootfs = canonical_rootfs(&request.rootfs)?;

        let record = ContainerRecord::new(ContainerId::generate(), rootfs, limits);
        self.store.create(&record)?;
        tracing::info!(
            id = %record.id,
            rootfs = %record.rootfs.display(),
            memory = %record.limits.memory_limit,
            cpu_quota = %record.limits.cpu_quota,
            "container created"
        );
        let _ = writeln!(diag, "==> hutch: creating container {}", record.id);

        let launched = self.executor.launch(&executor_args(&record), diag);
        self.settle(&record.id, launched, diag)
    }

    /// Relaunches a stopped or failed container with its stored limits.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::InvalidState`] if the container is running or
    /// still launching (no helper is invoked), resolution errors, or
    /// [`HutchError::HelperFailure`] if the executor did not hand off.
    pub fn start(&self, prefix: &str, diag: &mut dyn Write) -> Result<ContainerRecord> {
        let record = resolve::resolve(&self.store, prefix)?;
        if record.status == ContainerStatus::Running {
            return Err(HutchError::InvalidState {
                id: record.id.to_string(),
                status: record.status,
                message: "already running; stop it first".into(),
            });
        }
        if !record.status.can_start() {
            return Err(HutchError::InvalidState {
                id: record.id.to_string(),
                status: record.status,
                message: "only stopped or failed containers can be started".into(),
            });
        }

        if let Some(old_pid) = record.pid.filter(|pid| !process::is_alive(*pid)) {
            let leaf = cgroup::leaf_path(&self.config.cgroup_base, old_pid);
            if let Err(e) = cgroup::remove_leaf(&leaf) {
                tracing::warn!(id = %record.id, leaf = %leaf.display(), error = %e, "stale cgroup left in place");
            }
        }

        let record = self
            .store
            .update(&record.id, |r| r.status = ContainerStatus::Starting)?;
        let _ = writeln!(diag, "==> hutch: starting container {}", record.id);

        let launched = self.executor.launch(&executor_args(&record), diag);
        self.settle(&record.id, launched, diag)
    }

    /// Persists the outcome of an executor launch.
    fn settle(
        &self,
        id: &ContainerId,
        launched: Result<Launch>,
        diag: &mut dyn Write,
    ) -> Result<ContainerRecord> {
        match launched {
            Ok(launch) => {
                let recorded = self.store.update(id, |r| {
                    r.status = ContainerStatus::Running;
                    r.pid = Some(launch.child_pid);
                });
                match recorded {
                    Ok(record) => {
                        tracing::info!(id = %id, pid = launch.child_pid, "container running");
                        let _ = writeln!(
                            diag,
                            "==> hutch: container {id} running with PID {}",
                            launch.child_pid
                        );
                        Ok(record)
                    }
                    Err(e) => {
                        tracing::error!(id = %id, pid = launch.child_pid, error = %e, "could not record launch");
                        self.mark_failed(id, diag);
                        Err(e)
                    }
                }
            }
            Err(failure) => {
                tracing::warn!(id = %id, error = %failure, "launch failed");
                self.mark_failed(id, diag);
                Err(failure)
            }
        }
    }

    /// Best-effort write of `failed` after a launch could not be recorded.
    fn mark_failed(&self, id: &ContainerId, diag: &mut dyn Write) {
        if let Err(e) = self.store.update(id, |r| r.status = ContainerStatus::Failed) {
            tracing::error!(id = %id, error = %e, "could not record failed launch");
        }
        let _ = writeln!(diag, "==> hutch: container {id} failed to launch");
    }

    /// Sends a graceful termination signal to a container's init process.
    ///
    /// A container whose process is already gone is marked stopped without
    /// signalling anything, so repeated calls are harmless.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::PermissionDenied`] or [`HutchError::Process`]
    /// when the signal could not be delivered; the status is left as is.
    pub fn stop(&self, prefix: &str) -> Result<(ContainerRecord, StopOutcome)> {
        let record = resolve::resolve(&self.store, prefix)?;
        let live_pid = record
            .pid
            .filter(|pid| record.status.is_active() && process::is_alive(*pid));

        let outcome = match live_pid {
            Some(pid) => match process::terminate(pid)? {
                Termination::Signalled => StopOutcome::Signalled,
                Termination::AlreadyGone => StopOutcome::AlreadyStopped,
            },
            None => StopOutcome::AlreadyStopped,
        };

        let record = if record.status == ContainerStatus::Stopped {
            record
        } else {
            self.store
                .update(&record.id, |r| r.status = ContainerStatus::Stopped)?
        };
        tracing::info!(id = %record.id, ?outcome, "container stopped");
        Ok((record, outcome))
    }

    /// Removes a container whose process is gone, along with its overlay
    /// and cgroup leftovers.
    ///
    /// The stored pid is checked whatever the status, so a process that
    /// outlived `stop` keeps its record.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::InvalidState`] if the recorded process is
    /// still alive (nothing is touched), or
    /// [`HutchError::CleanupPartialFailure`] if any teardown step failed.
    pub fn remove(&self, prefix: &str) -> Result<CleanupReport> {
        let record = resolve::resolve(&self.store, prefix)?;
        if let Some(pid) = record.pid.filter(|pid| process::is_alive(*pid)) {
            let message = if record.status.is_active() {
                format!("process {pid} is still alive; stop it first")
            } else {
                format!("process {pid} is still alive; wait for it to exit or kill it")
            };
            return Err(HutchError::InvalidState {
                id: record.id.to_string(),
                status: record.status,
                message,
            });
        }

        let report = cleanup::teardown(
            &record,
            &self.store,
            &self.config.cgroup_base,
            &self.config.overlay_base,
        );
        if report.is_clean() {
            tracing::info!(id = %record.id, "container removed");
            Ok(report)
        } else {
            Err(HutchError::CleanupPartialFailure {
                id: record.id.to_string(),
                failures: report.failures(),
            })
        }
    }

    /// Marks records whose process died behind the supervisor's back as
    /// stopped, and returns every record by ascending ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be listed.
    pub fn reconcile(&self) -> Result<Vec<ContainerRecord>> {
        let mut records = self.store.list()?;
        for record in &mut records {
            let Some(pid) = record.pid else { continue };
            if !record.status.is_active() || process::is_alive(pid) {
                continue;
            }
            let updated = self.store.update(&record.id, |r| {
                if r.status.is_active() && r.pid == Some(pid) {
                    r.status = ContainerStatus::Stopped;
                }
            });
            match updated {
                Ok(updated) => {
                    tracing::info!(id = %record.id, pid, "process gone; marked stopped");
                    *record = updated;
                }
                Err(e) => tracing::warn!(id = %record.id, error = %e, "reconciliation skipped"),
            }
        }
        Ok(records)
    }

    /// Lists all containers after reconciling their status.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be listed.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        self.reconcile()
    }

    /// Reports a container's status and, while it runs, its accounting.
    ///
    /// # Errors
    ///
    /// Returns resolution errors.
    pub fn status(&self, prefix: &str) -> Result<StatusReport> {
        let record = resolve::resolve(&self.store, prefix)?;
        Ok(metrics::inspect(record, &self.config.cgroup_base))
    }

    /// Runs `command` inside a running container and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::InvalidState`] if the container has no live
    /// process or no overlay mount point, or a spawn failure of the entry
    /// tool.
    pub fn exec(&self, prefix: &str, command: &[String]) -> Result<i32> {
        let record = resolve::resolve(&self.store, prefix)?;
        let refuse = |message: String| HutchError::InvalidState {
            id: record.id.to_string(),
            status: record.status,
            message,
        };

        let pid = record
            .pid
            .filter(|pid| record.status == ContainerStatus::Running && process::is_alive(*pid))
            .ok_or_else(|| refuse("container is not running".into()))?;
        if record.hostname.is_empty() {
            return Err(refuse("record has no hostname".into()));
        }
        let overlay = self.overlay_paths(&record);
        if !overlay.merged_dir.is_dir() {
            return Err(refuse(format!(
                "container root {} does not exist",
                overlay.merged_dir.display()
            )));
        }

        crate::exec::exec_in_container(&self.entry_tool, pid, &overlay.merged_dir, command)
    }

    /// Overlay locations derived from a record's hostname.
    #[must_use]
    pub fn overlay_paths(&self, record: &ContainerRecord) -> OverlayPaths {
        OverlayPaths::for_hostname(&self.config.overlay_base, &record.hostname)
    }
}

/// Positional executor arguments: hostname, rootfs, memory, CPU quota.
fn executor_args(record: &ContainerRecord) -> Vec<OsString> {
    vec![
        OsString::from(&record.hostname),
        record.rootfs.clone().into_os_string(),
        OsString::from(&record.limits.memory_limit),
        OsString::from(&record.limits.cpu_quota),
    ]
}

/// Resolves the root filesystem to an absolute directory path.
fn canonical_rootfs(rootfs: &Path) -> Result<PathBuf> {
    let resolved = std::fs::canonicalize(rootfs).map_err(|e| HutchError::InvalidArgument {
        message: format!("root filesystem {}: {e}", rootfs.display()),
    })?;
    if !resolved.is_dir() {
        return Err(HutchError::InvalidArgument {
            message: format!("root filesystem {} is not a directory", rootfs.display()),
        });
    }
    Ok(resolved)
}
