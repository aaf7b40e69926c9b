//! Domain primitive types used across the hutch workspace.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{CPU_PERIOD_US, HOSTNAME_PREFIX, ID_LENGTH, NO_LIMIT};
use crate::error::{HutchError, Result};

/// Unique identifier for a container instance.
///
/// Doubles as the storage key of the container's record and as the
/// seed of its hostname.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random 12-character lowercase hex container ID.
    #[must_use]
    pub fn generate() -> Self {
        let mut raw = uuid::Uuid::new_v4().simple().to_string();
        raw.truncate(ID_LENGTH);
        Self(raw)
    }

    /// Returns the hostname the executor assigns to this container.
    #[must_use]
    pub fn hostname(&self) -> String {
        format!("{HOSTNAME_PREFIX}{}", self.0)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Lifecycle status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// `run` has written the record and is launching the executor.
    Creating,
    /// `start` is relaunching the executor for an existing record.
    Starting,
    /// The executor handed off a live init process.
    Running,
    /// The init process was signalled or found dead.
    Stopped,
    /// The last launch attempt did not hand off a process.
    Failed,
}

impl ContainerStatus {
    /// Whether this status claims a process may be alive.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Creating | Self::Starting | Self::Running)
    }

    /// Whether `start` may relaunch a container in this status.
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Creating => "creating",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        })
    }
}

/// Resource limits forwarded verbatim to the executor.
///
/// Both values are fixed at creation; changing them means removing and
/// re-creating the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling as accepted by cgroup `memory.max`, or `none`.
    pub memory_limit: String,
    /// CPU quota in microseconds per period, or `none`.
    pub cpu_quota: String,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_limit: NO_LIMIT.to_string(),
            cpu_quota: NO_LIMIT.to_string(),
        }
    }
}

impl ResourceLimits {
    /// Builds limits from the user's `--memory` and `--cpu` values.
    ///
    /// # Errors
    ///
    /// Returns [`HutchError::InvalidArgument`] if the memory spec is not
    /// understood by cgroup v2 or the CPU fraction is not a positive number.
    pub fn from_request(memory: Option<&str>, cpu: Option<f64>) -> Result<Self> {
        let memory_limit = match memory {
            Some(spec) => {
                validate_memory_limit(spec)?;
                spec.to_string()
            }
            None => NO_LIMIT.to_string(),
        };
        let cpu_quota = match cpu {
            Some(fraction) => cpu_quota_from_fraction(fraction)?.to_string(),
            None => NO_LIMIT.to_string(),
        };
        Ok(Self {
            memory_limit,
            cpu_quota,
        })
    }
}

/// Converts a fraction of one CPU into a quota per [`CPU_PERIOD_US`].
///
/// The product is truncated, so `0.333` yields `33300`.
///
/// # Errors
///
/// Returns [`HutchError::InvalidArgument`] for zero, negative, or
/// non-finite fractions.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn cpu_quota_from_fraction(fraction: f64) -> Result<u64> {
    if !fraction.is_finite() || fraction <= 0.0 {
        return Err(HutchError::InvalidArgument {
            message: format!("CPU quota must be a positive number, got {fraction}"),
        });
    }
    let quota = (fraction * CPU_PERIOD_US as f64) as u64;
    if quota == 0 {
        return Err(HutchError::InvalidArgument {
            message: format!("CPU quota {fraction} is below one microsecond per period"),
        });
    }
    Ok(quota)
}

/// Validates a memory limit string for cgroup v2 `memory.max`.
///
/// Accepts `max`, `none`, a byte count, or a count with a single-letter
/// `K`, `M`, `G`, `T`, `P`, or `E` suffix in either case. Binary `Ki`-style
/// suffixes are not part of the `memory.max` syntax and are rejected.
///
/// # Errors
///
/// Returns [`HutchError::InvalidArgument`] for anything else.
pub fn validate_memory_limit(limit: &str) -> Result<()> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let valid = PATTERN
        .get_or_init(|| Regex::new(r"^(max|none|[0-9]+[kKmMgGtTpPeE]?)$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(limit));
    if valid {
        Ok(())
    } else {
        Err(HutchError::InvalidArgument {
            message: format!(
                "unsupported memory limit '{limit}'; use max, none, bytes, or a K/M/G/T/P/E suffix"
            ),
        })
    }
}
