//! End-to-end lifecycle tests for the hutch runtime.
//!
//! The executor and entry tool are simulated by `/bin/sh` scripts run
//! through the escalation prefix, so the real handoff protocol, record
//! store, and teardown run against an isolated temporary root:
//! 1. `run` outcomes for every executor behavior
//! 2. `start` state checks
//! 3. `stop` idempotence
//! 4. `rm` liveness guard and best-effort cleanup
//! 5. Prefix resolution through the engine

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::path::{Path, PathBuf};

use hutch_common::config::SupervisorConfig;
use hutch_common::error::{HelperFailureReason, HutchError};
use hutch_common::types::{ContainerId, ContainerStatus, ResourceLimits};
use hutch_runtime::engine::{Engine, RunRequest, StopOutcome};
use hutch_runtime::state::ContainerRecord;

const LIVE_CHILD: &str = "sleep 30 >/dev/null 2>&1 &\n\
                          echo \"==> EXECUTOR: Created child with PID $!\" >&2\n\
                          echo '==> EXECUTOR: Parent process is exiting.' >&2\n";

struct Sandbox {
    dir: tempfile::TempDir,
    engine: Engine,
}

impl Sandbox {
    fn new(executor_script: &str) -> Self {
        Self::with_timeout(executor_script, 2000)
    }

    fn with_timeout(executor_script: &str, timeout_ms: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("rootfs")).unwrap();
        std::fs::write(dir.path().join("executor.sh"), executor_script).unwrap();

        let mut config = SupervisorConfig::rooted_at(dir.path());
        config.executor = dir.path().join("executor.sh");
        config.entry_tool = dir.path().join("enter.sh");
        config.escalation = vec!["/bin/sh".into()];
        config.helper_timeout_ms = timeout_ms;
        let engine = Engine::open(config).unwrap();
        Self { dir, engine }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn rootfs_request(&self) -> RunRequest {
        RunRequest {
            rootfs: self.path("rootfs"),
            ..RunRequest::default()
        }
    }

    fn run_expecting_failure(&self) -> (HutchError, ContainerRecord) {
        let err = self
            .engine
            .run(&self.rootfs_request(), &mut Vec::new())
            .unwrap_err();
        let records = self.engine.list().unwrap();
        assert_eq!(records.len(), 1);
        (err, records.into_iter().next().unwrap())
    }

    fn seed(&self, id: &str, status: ContainerStatus, pid: Option<u32>) {
        let mut record = ContainerRecord::new(
            ContainerId::new(id),
            self.path("rootfs"),
            ResourceLimits::default(),
        );
        record.status = status;
        record.pid = pid;
        self.engine.store().create(&record).unwrap();
    }
}

fn stop_container(engine: &Engine, id: &ContainerId) {
    let _ = engine.stop(id.as_str()).unwrap();
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// ── Run ──────────────────────────────────────────────────────────────

#[test]
fn run_with_limits_forwards_quota_and_persists_pid() {
    let sandbox = Sandbox::new("");
    let args_file = sandbox.path("args");
    std::fs::write(
        sandbox.path("executor.sh"),
        format!(
            "for a in \"$@\"; do echo \"$a\" >> '{}'; done\n\
             echo 'Created child with PID 4821' >&2\n\
             echo 'Parent process is exiting' >&2\n",
            args_file.display()
        ),
    )
    .unwrap();

    let request = RunRequest {
        rootfs: sandbox.path("rootfs"),
        memory: Some("100M".into()),
        cpu: Some(0.5),
    };
    let mut diag = Vec::new();
    let record = sandbox.engine.run(&request, &mut diag).unwrap();

    assert_eq!(record.status, ContainerStatus::Running);
    assert_eq!(record.pid, Some(4821));
    assert_eq!(record.limits.memory_limit, "100M");
    assert_eq!(record.limits.cpu_quota, "50000");

    let stored = sandbox.engine.store().read(&record.id).unwrap();
    assert_eq!(stored, record);

    let rootfs = std::fs::canonicalize(sandbox.path("rootfs")).unwrap();
    assert_eq!(
        read_lines(&args_file),
        [
            record.hostname.clone(),
            rootfs.display().to_string(),
            "100M".to_string(),
            "50000".to_string(),
        ]
    );

    let echoed = String::from_utf8(diag).unwrap();
    let pid_line = echoed.find("Created child with PID 4821").unwrap();
    let exit_line = echoed.find("Parent process is exiting").unwrap();
    assert!(pid_line < exit_line);
}

#[test]
fn run_without_limits_passes_none() {
    let sandbox = Sandbox::new("");
    let args_file = sandbox.path("args");
    std::fs::write(
        sandbox.path("executor.sh"),
        format!("echo \"$3 $4\" > '{}'\n{LIVE_CHILD}", args_file.display()),
    )
    .unwrap();

    let record = sandbox
        .engine
        .run(&sandbox.rootfs_request(), &mut Vec::new())
        .unwrap();
    assert_eq!(read_lines(&args_file), ["none none"]);
    stop_container(&sandbox.engine, &record.id);
}

#[test]
fn run_then_list_shows_running() {
    let sandbox = Sandbox::new(LIVE_CHILD);
    let record = sandbox
        .engine
        .run(&sandbox.rootfs_request(), &mut Vec::new())
        .unwrap();

    let records = sandbox.engine.list().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, record.id);
    assert_eq!(records[0].status, ContainerStatus::Running);

    stop_container(&sandbox.engine, &record.id);
}

#[test]
fn run_exit_zero_without_pid_is_failed() {
    let sandbox = Sandbox::new("echo 'mount done' >&2\nexit 0\n");
    let (err, record) = sandbox.run_expecting_failure();

    assert!(matches!(
        err,
        HutchError::HelperFailure {
            reason: HelperFailureReason::MissingPid,
            ..
        }
    ));
    assert_eq!(record.status, ContainerStatus::Failed);
    assert_eq!(record.pid, None);
}

#[test]
fn run_exit_one_with_pid_is_failed_and_pid_discarded() {
    let sandbox = Sandbox::new("echo 'Created child with PID 4821' >&2\nexit 1\n");
    let (err, record) = sandbox.run_expecting_failure();

    match err {
        HutchError::HelperFailure {
            reason: HelperFailureReason::NonZeroExit { code, announced_pid },
            diagnostics,
        } => {
            assert_eq!(code, Some(1));
            assert_eq!(announced_pid, Some(4821));
            assert!(diagnostics.contains("Created child with PID 4821"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(record.status, ContainerStatus::Failed);
    assert_eq!(record.pid, None);
}

#[test]
fn run_hanging_executor_times_out_as_failed() {
    let sandbox = Sandbox::with_timeout("echo 'setting up' >&2\nexec sleep 10\n", 300);
    let started = std::time::Instant::now();
    let (err, record) = sandbox.run_expecting_failure();

    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert!(matches!(
        err,
        HutchError::HelperFailure {
            reason: HelperFailureReason::TimedOut(_),
            ..
        }
    ));
    assert_eq!(record.status, ContainerStatus::Failed);
}

#[test]
fn run_with_missing_executor_is_failed() {
    let sandbox = Sandbox::new("");
    std::fs::remove_file(sandbox.path("executor.sh")).unwrap();
    let (err, record) = sandbox.run_expecting_failure();
    assert!(matches!(err, HutchError::HelperFailure { .. }));
    assert_eq!(record.status, ContainerStatus::Failed);
}

#[test]
fn run_rejects_file_as_rootfs() {
    let sandbox = Sandbox::new(LIVE_CHILD);
    let request = RunRequest {
        rootfs: sandbox.path("executor.sh"),
        ..RunRequest::default()
    };
    let err = sandbox.engine.run(&request, &mut Vec::new()).unwrap_err();
    assert!(matches!(err, HutchError::InvalidArgument { .. }));
    assert!(sandbox.engine.list().unwrap().is_empty());
}

// ── Start ────────────────────────────────────────────────────────────

#[test]
fn start_on_running_is_rejected_without_invoking_executor() {
    let sandbox = Sandbox::new("");
    let marker = sandbox.path("invoked");
    std::fs::write(
        sandbox.path("executor.sh"),
        format!("touch '{}'\n{LIVE_CHILD}", marker.display()),
    )
    .unwrap();
    sandbox.seed("abc123def456", ContainerStatus::Running, Some(std::process::id()));
    let before = std::fs::read(
        sandbox
            .engine
            .store()
            .record_dir(&ContainerId::new("abc123def456"))
            .join("config.json"),
    )
    .unwrap();

    let err = sandbox.engine.start("abc123", &mut Vec::new()).unwrap_err();

    assert!(matches!(
        err,
        HutchError::InvalidState {
            status: ContainerStatus::Running,
            ..
        }
    ));
    assert!(!marker.exists());
    let after = std::fs::read(
        sandbox
            .engine
            .store()
            .record_dir(&ContainerId::new("abc123def456"))
            .join("config.json"),
    )
    .unwrap();
    assert_eq!(before, after);
}

#[test]
fn start_relaunches_stopped_container_with_new_pid() {
    let sandbox = Sandbox::new(LIVE_CHILD);
    sandbox.seed("abc123def456", ContainerStatus::Stopped, Some(999_999_999));
    let stale_leaf = sandbox.path("cgroup").join("999999999");
    std::fs::create_dir_all(&stale_leaf).unwrap();

    let record = sandbox.engine.start("abc", &mut Vec::new()).unwrap();

    assert_eq!(record.status, ContainerStatus::Running);
    assert_ne!(record.pid, Some(999_999_999));
    assert!(!stale_leaf.exists());
    stop_container(&sandbox.engine, &record.id);
}

#[test]
fn failed_start_keeps_limits_and_marks_failed() {
    let sandbox = Sandbox::new("exit 2\n");
    sandbox.seed("abc123def456", ContainerStatus::Failed, None);

    let err = sandbox.engine.start("abc", &mut Vec::new()).unwrap_err();
    assert!(matches!(err, HutchError::HelperFailure { .. }));

    let stored = sandbox
        .engine
        .store()
        .read(&ContainerId::new("abc123def456"))
        .unwrap();
    assert_eq!(stored.status, ContainerStatus::Failed);
    assert_eq!(stored.limits, ResourceLimits::default());
}

// ── Stop ─────────────────────────────────────────────────────────────

#[test]
fn stop_on_dead_process_is_idempotent() {
    let sandbox = Sandbox::new(
        "echo 'Created child with PID 999999999' >&2\necho 'Parent process is exiting' >&2\n",
    );
    let record = sandbox
        .engine
        .run(&sandbox.rootfs_request(), &mut Vec::new())
        .unwrap();

    for _ in 0..3 {
        let (stopped, outcome) = sandbox.engine.stop(record.id.as_str()).unwrap();
        assert_eq!(outcome, StopOutcome::AlreadyStopped);
        assert_eq!(stopped.status, ContainerStatus::Stopped);
    }
}

#[test]
fn stop_terminates_running_container() {
    let sandbox = Sandbox::new(LIVE_CHILD);
    let record = sandbox
        .engine
        .run(&sandbox.rootfs_request(), &mut Vec::new())
        .unwrap();

    let (stopped, outcome) = sandbox.engine.stop(record.id.as_str()).unwrap();
    assert_eq!(outcome, StopOutcome::Signalled);
    assert_eq!(stopped.status, ContainerStatus::Stopped);
}

// ── Remove ───────────────────────────────────────────────────────────

#[test]
fn rm_on_live_container_is_rejected() {
    let sandbox = Sandbox::new(LIVE_CHILD);
    let record = sandbox
        .engine
        .run(&sandbox.rootfs_request(), &mut Vec::new())
        .unwrap();

    let err = sandbox.engine.remove(record.id.as_str()).unwrap_err();
    assert!(matches!(err, HutchError::InvalidState { .. }));
    assert_eq!(sandbox.engine.list().unwrap().len(), 1);

    stop_container(&sandbox.engine, &record.id);
}

#[test]
fn rm_after_stop_refuses_while_process_survives_sigterm() {
    let sandbox = Sandbox::new(
        "trap '' TERM\n\
         sleep 30 >/dev/null 2>&1 &\n\
         echo \"==> EXECUTOR: Created child with PID $!\" >&2\n\
         echo '==> EXECUTOR: Parent process is exiting.' >&2\n",
    );
    let record = sandbox
        .engine
        .run(&sandbox.rootfs_request(), &mut Vec::new())
        .unwrap();
    let pid = record.pid.unwrap();

    let (stopped, outcome) = sandbox.engine.stop(record.id.as_str()).unwrap();
    assert_eq!(outcome, StopOutcome::Signalled);
    assert_eq!(stopped.status, ContainerStatus::Stopped);

    let err = sandbox.engine.remove(record.id.as_str()).unwrap_err();
    assert!(matches!(
        err,
        HutchError::InvalidState {
            status: ContainerStatus::Stopped,
            ..
        }
    ));
    assert_eq!(sandbox.engine.list().unwrap().len(), 1);
    assert!(sandbox.engine.store().read(&record.id).is_ok());

    let target = nix::unistd::Pid::from_raw(i32::try_from(pid).unwrap());
    nix::sys::signal::kill(target, nix::sys::signal::Signal::SIGKILL).unwrap();
}

#[test]
fn rm_on_stopped_container_removes_record_and_overlay() {
    let sandbox = Sandbox::new(LIVE_CHILD);
    sandbox.seed("abc123def456", ContainerStatus::Stopped, Some(999_999_999));
    let record = sandbox
        .engine
        .store()
        .read(&ContainerId::new("abc123def456"))
        .unwrap();
    let overlay = sandbox.engine.overlay_paths(&record);
    for dir in [&overlay.merged_dir, &overlay.upper_dir, &overlay.work_dir] {
        std::fs::create_dir_all(dir).unwrap();
    }

    let report = sandbox.engine.remove("abc").unwrap();

    assert!(report.is_clean());
    assert!(sandbox.engine.list().unwrap().is_empty());
    assert!(!overlay.merged_dir.exists());
    assert!(!overlay.upper_dir.exists());
    assert!(!overlay.work_dir.exists());
}

#[test]
fn rm_removes_record_even_when_a_step_fails() {
    let sandbox = Sandbox::new(LIVE_CHILD);
    sandbox.seed("abc123def456", ContainerStatus::Stopped, Some(999_999_999));
    let leaf = sandbox.path("cgroup").join("999999999");
    std::fs::create_dir_all(&leaf).unwrap();
    std::fs::write(leaf.join("cgroup.procs"), "").unwrap();

    let err = sandbox.engine.remove("abc").unwrap_err();

    match err {
        HutchError::CleanupPartialFailure { id, failures } => {
            assert_eq!(id, "abc123def456");
            assert_eq!(failures.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(sandbox.engine.list().unwrap().is_empty());
}

// ── Resolution ───────────────────────────────────────────────────────

#[test]
fn ambiguous_prefix_is_reported_not_guessed() {
    let sandbox = Sandbox::new(LIVE_CHILD);
    sandbox.seed("abc123def456", ContainerStatus::Stopped, None);
    sandbox.seed("abc999xyz000", ContainerStatus::Stopped, None);

    let err = sandbox.engine.status("abc").unwrap_err();
    assert!(matches!(err, HutchError::Ambiguous { .. }));
    assert!(err.to_string().contains("abc"));

    let report = sandbox.engine.status("abc123").unwrap();
    assert_eq!(report.record.id.as_str(), "abc123def456");

    let err = sandbox.engine.stop("xyz").unwrap_err();
    assert!(matches!(err, HutchError::NotFound { .. }));
}
