//! Probing and signalling container init processes.

use hutch_common::error::{HutchError, Result};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

/// Outcome of asking a container process to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGTERM was delivered.
    Signalled,
    /// The process no longer existed.
    AlreadyGone,
}

/// Converts a stored PID into a signal target.
///
/// PID 0 and values beyond `i32::MAX` would address process groups or
/// wrap, so they are never targeted.
fn target(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|raw| *raw > 0).map(Pid::from_raw)
}

/// Whether a process with this PID currently exists.
///
/// A process owned by another user still counts as alive; a zombie
/// waiting to be reaped does not.
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    target(pid).is_some_and(|target| {
        matches!(kill(target, None), Ok(()) | Err(Errno::EPERM)) && !is_zombie(pid)
    })
}

/// Reads the state field of `/proc/<pid>/stat`; unreadable means unknown.
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let (_, after_comm) = stat.rsplit_once(')')?;
            after_comm.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}

/// Sends SIGTERM to `pid` for a graceful shutdown.
///
/// # Errors
///
/// Returns [`HutchError::PermissionDenied`] when the caller may not
/// signal the process, or [`HutchError::Process`] for any other failure.
pub fn terminate(pid: u32) -> Result<Termination> {
    let Some(target) = target(pid) else {
        return Ok(Termination::AlreadyGone);
    };
    termination_from(pid, kill(target, Signal::SIGTERM))
}

/// Classifies the result of delivering SIGTERM to `pid`.
fn termination_from(pid: u32, delivered: nix::Result<()>) -> Result<Termination> {
    match delivered {
        Ok(()) => {
            tracing::info!(pid, "sent SIGTERM");
            Ok(Termination::Signalled)
        }
        Err(Errno::ESRCH) => Ok(Termination::AlreadyGone),
        Err(Errno::EPERM) => Err(HutchError::PermissionDenied {
            message: format!("cannot signal process {pid}; try again with sudo"),
        }),
        Err(errno) => Err(HutchError::Process {
            pid,
            message: errno.desc().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn unrepresentable_pids_are_never_alive() {
        assert!(!is_alive(0));
        assert!(!is_alive(u32::MAX));
        assert!(!is_alive(999_999_999));
    }

    #[test]
    fn terminate_missing_process_is_already_gone() {
        assert_eq!(terminate(999_999_999).unwrap(), Termination::AlreadyGone);
        assert_eq!(terminate(0).unwrap(), Termination::AlreadyGone);
    }

    #[test]
    fn unreaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !is_zombie(child.id()) && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(!is_alive(child.id()));
        let _ = child.wait().unwrap();
    }

    #[test]
    fn denied_signal_is_permission_denied() {
        let err = termination_from(1, Err(Errno::EPERM)).unwrap_err();
        assert!(matches!(err, HutchError::PermissionDenied { .. }));
        assert!(err.to_string().contains("sudo"));
    }

    #[test]
    fn delivery_outcomes_are_classified() {
        assert_eq!(termination_from(7, Ok(())).unwrap(), Termination::Signalled);
        assert_eq!(
            termination_from(7, Err(Errno::ESRCH)).unwrap(),
            Termination::AlreadyGone
        );
        assert!(matches!(
            termination_from(7, Err(Errno::EINVAL)),
            Err(HutchError::Process { pid: 7, .. })
        ));
    }

    #[test]
    fn terminate_signals_a_live_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        assert_eq!(terminate(child.id()).unwrap(), Termination::Signalled);
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}
