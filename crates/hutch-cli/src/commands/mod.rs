//! CLI command definitions and dispatch.

pub mod exec;
pub mod list;
pub mod rm;
pub mod run;
pub mod start;
pub mod status;
pub mod stop;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use hutch_common::config::SupervisorConfig;
use hutch_runtime::engine::Engine;

/// hutch: supervise containers built from an extracted root filesystem.
#[derive(Parser, Debug)]
#[command(name = hutch_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Overrides applied on top of the configuration file.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Configuration flags shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// JSON configuration file; flags below override its fields.
    #[arg(long, global = true, env = "HUTCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding container records.
    #[arg(long, global = true, env = "HUTCH_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Cgroup v2 directory holding per-process leaves.
    #[arg(long, global = true, env = "HUTCH_CGROUP_BASE")]
    pub cgroup_base: Option<PathBuf>,

    /// Directory holding overlay mount points and upper/work directories.
    #[arg(long, global = true, env = "HUTCH_OVERLAY_BASE")]
    pub overlay_base: Option<PathBuf>,

    /// Path of the executor helper.
    #[arg(long, global = true, env = "HUTCH_EXECUTOR")]
    pub executor: Option<PathBuf>,

    /// Path of the entry tool.
    #[arg(long, global = true, env = "HUTCH_ENTRY_TOOL")]
    pub entry_tool: Option<PathBuf>,

    /// Privilege escalation prefix, e.g. "sudo -n"; empty to run helpers directly.
    #[arg(long, global = true, env = "HUTCH_ESCALATION")]
    pub escalation: Option<String>,

    /// How long to wait for the executor to hand off, in milliseconds.
    #[arg(long, global = true, env = "HUTCH_HELPER_TIMEOUT_MS")]
    pub helper_timeout_ms: Option<u64>,
}

impl GlobalArgs {
    /// Builds the effective configuration: defaults, then the file, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded.
    pub fn resolve(&self) -> anyhow::Result<SupervisorConfig> {
        let mut config = match &self.config {
            Some(path) => SupervisorConfig::load(path)?,
            None => SupervisorConfig::default(),
        };
        if let Some(dir) = &self.state_dir {
            config.state_dir.clone_from(dir);
        }
        if let Some(dir) = &self.cgroup_base {
            config.cgroup_base.clone_from(dir);
        }
        if let Some(dir) = &self.overlay_base {
            config.overlay_base.clone_from(dir);
        }
        if let Some(path) = &self.executor {
            config.executor.clone_from(path);
        }
        if let Some(path) = &self.entry_tool {
            config.entry_tool.clone_from(path);
        }
        if let Some(prefix) = &self.escalation {
            config.escalation = prefix.split_whitespace().map(str::to_string).collect();
        }
        if let Some(ms) = self.helper_timeout_ms {
            config.helper_timeout_ms = ms;
        }
        tracing::debug!(?config, "effective configuration");
        Ok(config)
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and launch a container from a root filesystem.
    Run(run::RunArgs),
    /// Relaunch a stopped or failed container.
    Start(start::StartArgs),
    /// List all containers.
    List(list::ListArgs),
    /// Execute a command inside a running container.
    Exec(exec::ExecArgs),
    /// Show a container's status and resource usage.
    Status(status::StatusArgs),
    /// Gracefully stop a running container.
    Stop(stop::StopArgs),
    /// Remove a stopped container and everything derived from it.
    Rm(rm::RmArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let engine = Engine::open(cli.global.resolve()?)?;
    match cli.command {
        Command::Run(args) => run::execute(&args, &engine),
        Command::Start(args) => start::execute(&args, &engine),
        Command::List(args) => list::execute(&args, &engine),
        Command::Exec(args) => exec::execute(&args, &engine),
        Command::Status(args) => status::execute(&args, &engine),
        Command::Stop(args) => stop::execute(&args, &engine),
        Command::Rm(args) => rm::execute(&args, &engine),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn run_parses_limits() {
        let cli = Cli::try_parse_from([
            "hutch", "run", "/img/alpine", "--memory", "100M", "--cpu", "0.5",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.rootfs, Path::new("/img/alpine"));
        assert_eq!(args.memory.as_deref(), Some("100M"));
        assert_eq!(args.cpu, Some(0.5));
    }

    #[test]
    fn exec_keeps_command_flags() {
        let cli = Cli::try_parse_from(["hutch", "exec", "abc", "ls", "-la", "/"]).unwrap();
        let Command::Exec(args) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(args.container, "abc");
        assert_eq!(args.command, ["ls", "-la", "/"]);
    }

    #[test]
    fn exec_requires_a_command() {
        assert!(Cli::try_parse_from(["hutch", "exec", "abc"]).is_err());
    }

    #[test]
    fn global_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hutch.json");
        std::fs::write(&file, r#"{"state_dir": "/srv/hutch", "helper_timeout_ms": 500}"#)
            .unwrap();

        let cli = Cli::try_parse_from([
            "hutch",
            "list",
            "--config",
            file.to_str().unwrap(),
            "--helper-timeout-ms",
            "750",
            "--escalation",
            "sudo -n",
        ])
        .unwrap();
        let config = cli.global.resolve().unwrap();

        assert_eq!(config.state_dir, Path::new("/srv/hutch"));
        assert_eq!(config.helper_timeout_ms, 750);
        assert_eq!(config.escalation, ["sudo", "-n"]);
    }

    #[test]
    fn empty_escalation_runs_helpers_directly() {
        let args = GlobalArgs {
            escalation: Some(String::new()),
            ..GlobalArgs::default()
        };
        assert!(args.resolve().unwrap().escalation.is_empty());
    }
}
