//! Unified error types for the hutch workspace.
//!
//! Every fallible operation in the supervisor reports one of these
//! variants; the CLI renders them as a single human-readable line.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ContainerStatus;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum HutchError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A user-supplied argument was rejected before any side effect.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the rejected argument.
        message: String,
    },

    /// No container matches the given identifier.
    #[error("no such container: '{id}'")]
    NotFound {
        /// Identifier or prefix as supplied by the caller.
        id: String,
    },

    /// An identifier prefix matches more than one container.
    #[error("ambiguous container ID prefix '{prefix}' (matches {})", candidates.join(", "))]
    Ambiguous {
        /// Prefix as supplied by the caller.
        prefix: String,
        /// Every stored ID the prefix matched, ascending.
        candidates: Vec<String>,
    },

    /// A record with the same ID is already stored.
    #[error("container already exists: '{id}'")]
    AlreadyExists {
        /// Colliding container ID.
        id: String,
    },

    /// The operation is not valid for the container's current status.
    #[error("container '{id}' is {status}: {message}")]
    InvalidState {
        /// Container ID.
        id: String,
        /// Status at the time the operation was attempted.
        status: ContainerStatus,
        /// What was refused.
        message: String,
    },

    /// The OS rejected an operation for lack of privilege.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// A privileged helper did not hand off a running container.
    #[error("helper invocation failed: {reason}")]
    HelperFailure {
        /// Which part of the handoff went wrong.
        reason: HelperFailureReason,
        /// Every diagnostic line the helper emitted before the failure.
        diagnostics: String,
    },

    /// Signalling a container process failed for a reason other than privilege.
    #[error("failed to signal process {pid}: {message}")]
    Process {
        /// Target process ID.
        pid: u32,
        /// OS-level description of the failure.
        message: String,
    },

    /// One or more teardown steps of `rm` failed; later steps still ran.
    #[error("container '{id}' was only partially cleaned up: {}", failures.join("; "))]
    CleanupPartialFailure {
        /// Container ID.
        id: String,
        /// One line per failed step.
        failures: Vec<String>,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Distinguishes the ways a helper invocation can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperFailureReason {
    /// The helper process could not be spawned at all.
    Spawn(String),
    /// The privileged parent neither exited nor finished its handoff in time.
    TimedOut(Duration),
    /// The privileged parent exited unsuccessfully.
    NonZeroExit {
        /// Exit code, or `None` when terminated by a signal.
        code: Option<i32>,
        /// A PID that was announced before the failure; never persisted.
        announced_pid: Option<u32>,
    },
    /// The privileged parent exited cleanly but never announced a child PID.
    MissingPid,
}

impl fmt::Display for HelperFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(message) => write!(f, "could not spawn helper: {message}"),
            Self::TimedOut(after) => {
                write!(f, "helper did not finish within {}ms", after.as_millis())
            }
            Self::NonZeroExit {
                code: Some(code), ..
            } => write!(f, "helper exited with code {code}"),
            Self::NonZeroExit { code: None, .. } => write!(f, "helper was killed by a signal"),
            Self::MissingPid => write!(f, "helper exited without announcing a child PID"),
        }
    }
}

impl HutchError {
    /// Wraps an I/O error with the path it occurred at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, HutchError>;
