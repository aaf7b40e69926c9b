//! `hutch rm`: Remove a stopped container.

use clap::Args;
use hutch_runtime::engine::Engine;

/// Arguments for the `rm` command.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Container ID or unique ID prefix.
    pub container: String,
}

/// Executes the `rm` command.
///
/// Tears down the cgroup leaf, overlay mount and directories, then the
/// record. Every step runs even if an earlier one failed.
///
/// # Errors
///
/// Returns an error if the container is still running (nothing is
/// removed) or if any teardown step failed.
pub fn execute(args: &RmArgs, engine: &Engine) -> anyhow::Result<()> {
    let report = engine.remove(&args.container)?;
    for step in &report.steps {
        eprintln!("  {step}");
    }
    println!("Container {} removed.", report.id);
    Ok(())
}
