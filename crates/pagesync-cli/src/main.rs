//! pagesync CLI - mirror GitHub Pages sites into Notion
//!
//! This is the main entry point for the pagesync command-line interface.
//! Command implementations live in the library crate.

use colored::Colorize;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match pagesync_cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(pagesync_cli::error::exit_code_from_error(&err))
        },
    }
}
