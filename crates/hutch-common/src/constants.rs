//! System-wide constants and default paths.

/// Default base directory holding one subdirectory per container record.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/hutch";

/// Cgroups v2 subtree the executor places per-pid leaves under.
pub const DEFAULT_CGROUP_BASE: &str = "/sys/fs/cgroup/hutch";

/// Base directory for the overlay mount point and its upper/work pair.
pub const DEFAULT_OVERLAY_BASE: &str = "/tmp";

/// Name of the record file inside a container's state directory.
pub const RECORD_FILE: &str = "config.json";

/// Name of the advisory lock file inside a container's state directory.
pub const LOCK_FILE: &str = "record.lock";

/// File name of the executor helper, looked up next to the running binary.
pub const EXECUTOR_BIN: &str = "hutch-executor";

/// File name of the entry tool, looked up next to the running binary.
pub const ENTRY_TOOL_BIN: &str = "hutch-enter";

/// Program used to elevate helper invocations when not already root.
pub const ESCALATION_PROGRAM: &str = "sudo";

/// Bounded wait for the executor's privileged parent, in milliseconds.
pub const DEFAULT_HELPER_TIMEOUT_MS: u64 = 2000;

/// CFS bandwidth period the executor pairs with the CPU quota, in microseconds.
pub const CPU_PERIOD_US: u64 = 100_000;

/// Sentinel forwarded to the executor when a limit is not set.
pub const NO_LIMIT: &str = "none";

/// Number of hex characters in a generated container ID.
pub const ID_LENGTH: usize = 12;

/// Prefix of the hostname derived from a container ID.
pub const HOSTNAME_PREFIX: &str = "cont-";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "hutch";
