//! Logging initialization and configuration.
//!
//! Sets up the tracing subscriber and color control from CLI flags and
//! environment variables. Logs always go to stderr.

use anyhow::{Result, anyhow};
use colored::control as color_control;
use is_terminal::IsTerminal;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

/// Default filter directive for the given flags.
///
/// Machine-readable output drops to errors only unless `-v` asks for more.
pub fn default_directive(cli: &Cli) -> &'static str {
    if cli.verbose {
        "debug"
    } else if cli.quiet || cli.command.format().is_machine() {
        "error"
    } else {
        "warn"
    }
}

/// Initialize the logging subsystem based on CLI flags.
///
/// `RUST_LOG` takes precedence over the flag-derived level.
///
/// # Errors
///
/// Returns an error if the global tracing subscriber cannot be set.
pub fn initialize_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(cli)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    let installed = if cli.json_logs {
        builder.json().try_init()
    } else {
        builder.with_ansi(std::io::stderr().is_terminal()).try_init()
    };
    installed.map_err(|e| anyhow!("failed to initialize logging: {e}"))?;

    // Color control: disable when requested, NO_COLOR is set, or stdout is not a terminal
    let env_no_color = std::env::var_os("NO_COLOR").is_some();
    if cli.no_color || env_no_color || !std::io::stdout().is_terminal() {
        color_control::set_override(false);
    }
    Ok(())
}
