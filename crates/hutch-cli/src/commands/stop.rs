//! `hutch stop`: Gracefully stop a running container.

use clap::Args;
use hutch_runtime::engine::{Engine, StopOutcome};

/// Arguments for the `stop` command.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Container ID or unique ID prefix.
    pub container: String,
}

/// Executes the `stop` command.
///
/// Sends SIGTERM to the container's init process; a container whose
/// process is already gone is simply marked stopped.
///
/// # Errors
///
/// Returns an error if the signal cannot be delivered, e.g. for lack of
/// privilege; the status is then left untouched.
pub fn execute(args: &StopArgs, engine: &Engine) -> anyhow::Result<()> {
    let (record, outcome) = engine.stop(&args.container)?;
    match outcome {
        StopOutcome::Signalled => println!("Container {} stopped.", record.id),
        StopOutcome::AlreadyStopped => println!("Container {} was already stopped.", record.id),
    }
    Ok(())
}
