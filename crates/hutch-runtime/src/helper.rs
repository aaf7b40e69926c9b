//! Privileged helper invocation and the executor handoff protocol.
//!
//! The executor is a short-lived privileged parent that forks the
//! container's long-lived init process and exits. The init process keeps
//! the parent's stderr open, so the stream does not end when the parent
//! does; the protocol instead watches for the parent's announcements:
//!
//! 1. every stderr line is echoed to the caller's diagnostic channel as
//!    soon as it arrives;
//! 2. the first `Created child with PID <n>` line fixes the child PID;
//! 3. the `Parent process is exiting` line ends reading;
//! 4. the parent must exit zero, having announced a PID, before the
//!    deadline measured from spawn.

use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use hutch_common::error::{HelperFailureReason, HutchError, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};

use crate::handoff::Handoff;

/// How long to keep draining stderr once the parent has already exited.
const EXIT_DRAIN: Duration = Duration::from_millis(50);

/// An external helper run through the configured escalation prefix.
#[derive(Debug, Clone)]
pub struct Helper {
    program: PathBuf,
    escalation: Vec<String>,
    timeout: Duration,
}

/// A successful handoff from the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    /// PID of the container's init process.
    pub child_pid: u32,
    /// Exit code of the privileged parent (always zero).
    pub exit_code: i32,
    /// Every stderr line the helper emitted, newline-terminated.
    pub diagnostics: String,
}

impl Helper {
    /// Creates a helper for `program`, elevated with `escalation`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, escalation: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            escalation,
            timeout,
        }
    }

    /// Returns the helper program path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Builds the elevated command line for `args` without running it.
    #[must_use]
    pub fn command(&self, args: &[OsString]) -> std::process::Command {
        let mut command = match self.escalation.split_first() {
            Some((elevator, elevator_args)) => {
                let mut command = std::process::Command::new(elevator);
                let _ = command.args(elevator_args).arg(&self.program);
                command
            }
            None => std::process::Command::new(&self.program),
        };
        let _ = command.args(args);
        command
    }

    /// Runs the helper and waits for its handoff.
    ///
    /// Diagnostic lines are written to `diag` in the order the helper
    /// emitted them, before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::HelperFailure`] when the helper cannot be
    /// spawned, times out, exits non-zero, or never announces a PID. A PID
    /// announced by a failed invocation is reported but not returned.
    pub fn launch(&self, args: &[OsString], diag: &mut dyn Write) -> Result<Launch> {
        tracing::info!(program = %self.program.display(), ?args, "invoking helper");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| HutchError::HelperFailure {
                reason: HelperFailureReason::Spawn(format!("async runtime: {e}")),
                diagnostics: String::new(),
            })?;
        runtime.block_on(self.launch_async(args, diag))
    }

    async fn launch_async(&self, args: &[OsString], diag: &mut dyn Write) -> Result<Launch> {
        let mut command = tokio::process::Command::from(self.command(args));
        let _ = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| HutchError::HelperFailure {
            reason: HelperFailureReason::Spawn(format!("{}: {e}", self.program.display())),
            diagnostics: String::new(),
        })?;
        if let Some(stdout) = child.stdout.take() {
            drop(tokio::spawn(drain_stdout(stdout)));
        }
        let stderr = child.stderr.take();

        let mut handoff = Handoff::default();
        let mut diagnostics = String::new();
        let waited = tokio::time::timeout(
            self.timeout,
            follow_handoff(&mut child, stderr, &mut handoff, &mut diagnostics, diag),
        )
        .await;

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(HutchError::io(&self.program, e)),
            Err(_) => {
                tracing::warn!(
                    program = %self.program.display(),
                    timeout_ms = self.timeout.as_millis(),
                    "helper timed out"
                );
                let _ = child.start_kill();
                let _ = child.try_wait();
                return Err(HutchError::HelperFailure {
                    reason: HelperFailureReason::TimedOut(self.timeout),
                    diagnostics,
                });
            }
        };

        match (status.success(), handoff.child_pid()) {
            (true, Some(child_pid)) => {
                tracing::info!(child_pid, "helper handed off container process");
                Ok(Launch {
                    child_pid,
                    exit_code: 0,
                    diagnostics,
                })
            }
            (true, None) => Err(HutchError::HelperFailure {
                reason: HelperFailureReason::MissingPid,
                diagnostics,
            }),
            (false, announced_pid) => Err(HutchError::HelperFailure {
                reason: HelperFailureReason::NonZeroExit {
                    code: status.code(),
                    announced_pid,
                },
                diagnostics,
            }),
        }
    }
}

/// Echoes and parses stderr until the exit announcement or end of stream,
/// then returns the parent's exit status.
///
/// If the parent exits first, lines already in flight are still drained
/// for a short grace period.
async fn follow_handoff(
    child: &mut Child,
    stderr: Option<ChildStderr>,
    handoff: &mut Handoff,
    diagnostics: &mut String,
    diag: &mut dyn Write,
) -> std::io::Result<ExitStatus> {
    let Some(stderr) = stderr else {
        return child.wait().await;
    };
    let mut segments = BufReader::new(stderr).split(b'\n');
    let mut exited = None;

    loop {
        let segment = if exited.is_some() {
            match tokio::time::timeout(EXIT_DRAIN, segments.next_segment()).await {
                Ok(segment) => segment?,
                Err(_) => break,
            }
        } else {
            tokio::select! {
                segment = segments.next_segment() => segment?,
                status = child.wait() => {
                    exited = Some(status?);
                    continue;
                }
            }
        };
        let Some(bytes) = segment else {
            break;
        };

        let raw = String::from_utf8_lossy(&bytes);
        let line = raw.trim_end_matches('\r');
        let _ = writeln!(diag, "{line}");
        let _ = diag.flush();
        diagnostics.push_str(line);
        diagnostics.push('\n');
        if handoff.observe(line) {
            break;
        }
    }

    match exited {
        Some(status) => Ok(status),
        None => child.wait().await,
    }
}

async fn drain_stdout(stdout: ChildStdout) {
    let mut segments = BufReader::new(stdout).split(b'\n');
    while let Ok(Some(bytes)) = segments.next_segment().await {
        tracing::debug!(line = %String::from_utf8_lossy(&bytes), "helper stdout");
    }
}
