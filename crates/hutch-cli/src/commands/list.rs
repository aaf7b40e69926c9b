//! `hutch list`: List all containers.

use std::io::Write;

use clap::Args;
use hutch_common::types::ContainerStatus;
use hutch_runtime::engine::Engine;
use hutch_runtime::state::ContainerRecord;

use crate::output::{format_created, format_pid};

/// Arguments for the `list` command.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show running containers.
    #[arg(short, long)]
    pub running: bool,
}

/// Executes the `list` command.
///
/// Containers whose process has died since the last look are marked
/// stopped before they are shown.
///
/// # Errors
///
/// Returns an error if the state directory cannot be read.
pub fn execute(args: &ListArgs, engine: &Engine) -> anyhow::Result<()> {
    let records: Vec<_> = engine
        .list()?
        .into_iter()
        .filter(|r| !args.running || r.status == ContainerStatus::Running)
        .collect();

    if records.is_empty() {
        println!("No containers found.");
        return Ok(());
    }
    render(&records, &mut std::io::stdout().lock())?;
    Ok(())
}

fn render(records: &[ContainerRecord], out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "{:<14} {:<10} {:<8} {:<20}", "CONTAINER ID", "STATUS", "PID", "CREATED")?;
    for r in records {
        writeln!(
            out,
            "{:<14} {:<10} {:<8} {:<20}",
            r.id,
            r.status,
            format_pid(r.pid),
            format_created(r.created_at)
        )?;
    }
    Ok(())
}
