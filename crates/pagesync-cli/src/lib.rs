//! pagesync CLI - mirror GitHub Pages sites into Notion
//!
//! Argument parsing, logging setup, output rendering and exit codes around
//! `pagesync-core`.
use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
pub mod error;
mod output;
mod utils;

use crate::utils::initialize_logging;
use cli::{Cli, Commands};

/// Execute the pagesync CLI with the currently configured environment.
///
/// # Errors
///
/// Returns an error if logging setup or the command fails. Use
/// [`error::exit_code_from_error`] to turn it into a process exit code.
pub async fn run() -> Result<()> {
    // Convert Broken pipe panics into a clean exit
    std::panic::set_hook(Box::new(|info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe") || msg.contains("broken pipe") {
            std::process::exit(0);
        }
        eprintln!("{msg}");
    }));

    let cli = Cli::parse();
    initialize_logging(&cli)?;
    execute_command(&cli).await
}

async fn execute_command(cli: &Cli) -> Result<()> {
    let config = cli.config.as_deref();
    match &cli.command {
        Commands::Sync(args) => commands::sync(args, config).await,
        Commands::Preview(args) => commands::preview(args, config).await,
        Commands::Discover(args) => commands::discover(args, config).await,
    }
}
