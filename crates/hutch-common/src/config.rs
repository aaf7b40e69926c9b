//! Configuration model for the hutch supervisor.
//!
//! Every base directory and helper location lives here and is handed to
//! the engine at construction, so tests can redirect all of them into an
//! isolated root.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{HutchError, Result};

/// Root configuration for the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Directory holding one subdirectory per container record.
    pub state_dir: PathBuf,
    /// Cgroup v2 directory holding the executor's per-pid leaves.
    pub cgroup_base: PathBuf,
    /// Directory holding each container's overlay mount point, upper, and work dirs.
    pub overlay_base: PathBuf,
    /// Executor helper that creates a new container process.
    pub executor: PathBuf,
    /// Entry tool that attaches a command to a running container.
    pub entry_tool: PathBuf,
    /// Command prefix that runs a helper with elevated privilege.
    ///
    /// Empty when the supervisor already runs as root.
    pub escalation: Vec<String>,
    /// Bounded wait for the executor's privileged parent, in milliseconds.
    pub helper_timeout_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(constants::DEFAULT_STATE_DIR),
            cgroup_base: PathBuf::from(constants::DEFAULT_CGROUP_BASE),
            overlay_base: PathBuf::from(constants::DEFAULT_OVERLAY_BASE),
            executor: sibling_binary(constants::EXECUTOR_BIN),
            entry_tool: sibling_binary(constants::ENTRY_TOOL_BIN),
            escalation: default_escalation(),
            helper_timeout_ms: constants::DEFAULT_HELPER_TIMEOUT_MS,
        }
    }
}

impl SupervisorConfig {
    /// Creates a configuration with every base directory under `root`.
    ///
    /// Helper paths and escalation keep their defaults.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            state_dir: root.join("state"),
            cgroup_base: root.join("cgroup"),
            overlay_base: root.join("overlay"),
            ..Self::default()
        }
    }

    /// Loads a configuration from a JSON file; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| HutchError::io(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Returns the helper wait bound as a [`Duration`].
    #[must_use]
    pub const fn helper_timeout(&self) -> Duration {
        Duration::from_millis(self.helper_timeout_ms)
    }
}

/// Resolves a helper binary installed next to the running executable.
fn sibling_binary(name: &str) -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(name)))
        .unwrap_or_else(|| PathBuf::from(name))
}

/// Picks the escalation prefix: none for root, otherwise `sudo`.
fn default_escalation() -> Vec<String> {
    if nix::unistd::geteuid().is_root() {
        return Vec::new();
    }
    let program = which::which(constants::ESCALATION_PROGRAM).map_or_else(
        |_| constants::ESCALATION_PROGRAM.to_string(),
        |path| path.to_string_lossy().into_owned(),
    );
    vec![program]
}
