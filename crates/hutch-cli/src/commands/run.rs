//! `hutch run`: Create and launch a container.

use std::path::PathBuf;

use clap::Args;
use hutch_runtime::engine::{Engine, RunRequest};

use crate::output::{BOLD, GREEN, RESET};

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Extracted root filesystem directory.
    pub rootfs: PathBuf,

    /// Memory limit, e.g. 100M, 1G, or max.
    #[arg(short, long)]
    pub memory: Option<String>,

    /// CPU limit as a fraction of one core, e.g. 0.5.
    #[arg(short, long)]
    pub cpu: Option<f64>,
}

/// Executes the `run` command.
///
/// Executor output is streamed to stderr; the new container ID is
/// printed to stdout.
///
/// # Errors
///
/// Returns an error if validation fails or the executor does not hand
/// off a process. The container is then recorded as failed.
pub fn execute(args: &RunArgs, engine: &Engine) -> anyhow::Result<()> {
    let request = RunRequest {
        rootfs: args.rootfs.clone(),
        memory: args.memory.clone(),
        cpu: args.cpu,
    };
    let record = engine.run(&request, &mut std::io::stderr().lock())?;

    eprintln!(
        "{GREEN}●{RESET} {BOLD}{}{RESET} running (PID {})",
        record.id,
        crate::output::format_pid(record.pid)
    );
    println!("{}", record.id);
    Ok(())
}
