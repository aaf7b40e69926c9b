//! Parsing of the executor's handoff announcements.
//!
//! The executor's privileged parent forks the container's init process,
//! announces its PID on stderr, and then announces that it is exiting.
//! Two line forms are understood:
//!
//! ```text
//! ==> EXECUTOR: Created child with PID 4821
//! ==> EXECUTOR: Parent process is exiting. Child container remains active.
//! @hutch child-pid=4821
//! @hutch parent-exit
//! ```
//!
//! The first PID announcement wins; the exit announcement ends the handoff.

use std::sync::OnceLock;

use regex::Regex;

/// A handoff event recognized on a single stderr line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    /// The executor forked the container's init process with this PID.
    ChildPid(u32),
    /// The privileged parent finished its job and is exiting.
    ParentExiting,
}

static CHILD_PID: OnceLock<Option<Regex>> = OnceLock::new();
static TAGGED: OnceLock<Option<Regex>> = OnceLock::new();

fn pattern(cell: &'static OnceLock<Option<Regex>>, src: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(src).ok()).as_ref()
}

impl Announcement {
    /// Recognizes an announcement in `line`, if it carries one.
    ///
    /// A PID of zero or one that does not fit in 32 bits is ignored.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(caps) = pattern(&TAGGED, r"^@hutch\s+(child-pid=(\d+)|parent-exit)\s*$")
            .and_then(|re| re.captures(line))
        {
            return caps.get(2).map_or(Some(Self::ParentExiting), |pid| {
                parse_pid(pid.as_str()).map(Self::ChildPid)
            });
        }
        if line.contains("Parent process is exiting") {
            return Some(Self::ParentExiting);
        }
        pattern(&CHILD_PID, r"Created child with PID (\d+)")
            .and_then(|re| re.captures(line))
            .and_then(|caps| caps.get(1))
            .and_then(|pid| parse_pid(pid.as_str()))
            .map(Self::ChildPid)
    }
}

fn parse_pid(digits: &str) -> Option<u32> {
    digits.parse().ok().filter(|pid| *pid > 0)
}

/// Accumulates announcements over a helper's stderr stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Handoff {
    child_pid: Option<u32>,
    parent_exited: bool,
}

impl Handoff {
    /// Feeds one line; returns `true` once reading should stop.
    pub fn observe(&mut self, line: &str) -> bool {
        match Announcement::parse(line) {
            Some(Announcement::ChildPid(pid)) => {
                if let Some(first) = self.child_pid {
                    tracing::debug!(first, ignored = pid, "repeated PID announcement");
                } else {
                    self.child_pid = Some(pid);
                }
            }
            Some(Announcement::ParentExiting) => self.parent_exited = true,
            None => {}
        }
        self.parent_exited
    }

    /// The first announced child PID, if any.
    #[must_use]
    pub const fn child_pid(&self) -> Option<u32> {
        self.child_pid
    }

    /// Whether the parent announced that it is exiting.
    #[must_use]
    pub const fn parent_exited(&self) -> bool {
        self.parent_exited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_executor_free_text() {
        assert_eq!(
            Announcement::parse("==> EXECUTOR: Created child with PID 4821"),
            Some(Announcement::ChildPid(4821))
        );
        assert_eq!(
            Announcement::parse(
                "==> EXECUTOR: Parent process is exiting. Child container remains active."
            ),
            Some(Announcement::ParentExiting)
        );
    }

    #[test]
    fn parses_tagged_lines() {
        assert_eq!(
            Announcement::parse("@hutch child-pid=77"),
            Some(Announcement::ChildPid(77))
        );
        assert_eq!(
            Announcement::parse("@hutch parent-exit"),
            Some(Announcement::ParentExiting)
        );
    }

    #[test]
    fn ignores_unrelated_and_bogus_lines() {
        assert_eq!(Announcement::parse("==> CHILD: Waiting for parent setup..."), None);
        assert_eq!(Announcement::parse("Created child with PID 0"), None);
        assert_eq!(Announcement::parse("Created child with PID 99999999999"), None);
        assert_eq!(Announcement::parse("@hutch child-pid="), None);
    }

    #[test]
    fn first_pid_wins_and_exit_stops_reading() {
        let mut handoff = Handoff::default();
        assert!(!handoff.observe("Created child with PID 10"));
        assert!(!handoff.observe("Created child with PID 20"));
        assert_eq!(handoff.child_pid(), Some(10));
        assert!(handoff.observe("Parent process is exiting"));
        assert!(handoff.parent_exited());
    }
}
