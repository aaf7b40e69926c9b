//! `hutch start`: Relaunch a stopped or failed container.

use clap::Args;
use hutch_runtime::engine::Engine;

use crate::output::{BOLD, GREEN, RESET, format_pid};

/// Arguments for the `start` command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Container ID or unique ID prefix.
    pub container: String,
}

/// Executes the `start` command.
///
/// # Errors
///
/// Returns an error if the container is running or still launching, or
/// if the executor does not hand off a process.
pub fn execute(args: &StartArgs, engine: &Engine) -> anyhow::Result<()> {
    let record = engine.start(&args.container, &mut std::io::stderr().lock())?;
    eprintln!(
        "{GREEN}●{RESET} {BOLD}{}{RESET} running (PID {})",
        record.id,
        format_pid(record.pid)
    );
    println!("{}", record.id);
    Ok(())
}
