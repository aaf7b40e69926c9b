//! `hutch status`: Show a container's status and resource usage.

use std::io::Write;

use clap::Args;
use hutch_runtime::engine::Engine;
use hutch_runtime::metrics::StatusReport;

use crate::output::{format_bytes, format_created, format_pid};

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Container ID or unique ID prefix.
    pub container: String,
}

/// Executes the `status` command.
///
/// # Errors
///
/// Returns an error if the container cannot be resolved or its
/// accounting files exist but cannot be read.
pub fn execute(args: &StatusArgs, engine: &Engine) -> anyhow::Result<()> {
    let report = engine.status(&args.container)?;
    render(&report, &mut std::io::stdout().lock())?;
    Ok(())
}

fn render(report: &StatusReport, out: &mut dyn Write) -> std::io::Result<()> {
    let record = &report.record;
    writeln!(out, "Container:    {}", record.id)?;
    writeln!(out, "Hostname:     {}", record.hostname)?;
    writeln!(out, "Status:       {}", record.status)?;
    writeln!(out, "PID:          {}", format_pid(record.pid))?;
    writeln!(out, "Root FS:      {}", record.rootfs.display())?;
    writeln!(out, "Memory limit: {}", record.limits.memory_limit)?;
    writeln!(out, "CPU quota:    {}", record.limits.cpu_quota)?;
    writeln!(out, "Created:      {}", format_created(record.created_at))?;

    if !report.alive {
        if record.status.is_active() {
            writeln!(out, "Process:      not found")?;
        }
        return Ok(());
    }
    let Some(stats) = &report.stats else {
        return writeln!(out, "Stats:        unavailable");
    };
    writeln!(out, "Memory usage: {}", format_bytes(stats.memory_current))?;
    writeln!(out, "Memory max:   {}", stats.memory_max)?;
    writeln!(out, "CPU stats:")?;
    for line in stats.cpu_stat.lines() {
        writeln!(out, "  {line}")?;
    }
    Ok(())
}
