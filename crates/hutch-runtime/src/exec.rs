//! Attaching commands to running containers through the entry tool.
//!
//! The entry tool joins the namespaces of the container's init process,
//! chroots into its overlay mount point, and execs the command. Standard
//! streams are inherited, so terminals behave exactly as for a direct
//! child of the caller's shell.

use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;

use hutch_common::error::{HelperFailureReason, HutchError, Result};

use crate::helper::Helper;

/// Builds the entry tool's argument list: PID, mount point, then the command.
#[must_use]
pub fn entry_args(pid: u32, merged_dir: &Path, command: &[String]) -> Vec<OsString> {
    let mut args = vec![OsString::from(pid.to_string()), merged_dir.as_os_str().to_owned()];
    args.extend(command.iter().map(OsString::from));
    args
}

/// Runs `command` inside the container whose init process is `pid`.
///
/// Returns the entry tool's exit code; a tool killed by a signal yields
/// `128 + signal`.
///
/// # Errors
///
/// Returns [`HutchError::InvalidArgument`] for an empty command, or
/// [`HutchError::HelperFailure`] if the entry tool cannot be spawned.
pub fn exec_in_container(
    entry_tool: &Helper,
    pid: u32,
    merged_dir: &Path,
    command: &[String],
) -> Result<i32> {
    if command.is_empty() {
        return Err(HutchError::InvalidArgument {
            message: "exec command is empty".into(),
        });
    }
    tracing::info!(pid, root = %merged_dir.display(), cmd = ?command, "exec into container");

    let status = entry_tool
        .command(&entry_args(pid, merged_dir, command))
        .status()
        .map_err(|e| HutchError::HelperFailure {
            reason: HelperFailureReason::Spawn(format!(
                "{}: {e}",
                entry_tool.program().display()
            )),
            diagnostics: String::new(),
        })?;

    let code = status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(1);
    tracing::debug!(pid, code, "entry tool finished");
    Ok(code)
}
