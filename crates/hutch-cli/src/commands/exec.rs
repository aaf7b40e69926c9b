//! `hutch exec`: Execute a command inside a running container.

use clap::Args;
use hutch_runtime::engine::Engine;

/// Arguments for the `exec` command.
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Container ID or unique ID prefix.
    pub container: String,

    /// Command to execute, with its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Executes the `exec` command.
///
/// The command inherits the terminal; Ctrl+C is left to it and ignored
/// here. The process exits with the command's exit code.
///
/// # Errors
///
/// Returns an error if the container is not running or the entry tool
/// cannot be spawned.
pub fn execute(args: &ExecArgs, engine: &Engine) -> anyhow::Result<()> {
    ctrlc::set_handler(|| {})
        .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    let code = engine.exec(&args.container, &args.command)?;
    tracing::debug!(code, "exec finished");
    std::process::exit(code);
}
