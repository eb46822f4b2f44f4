use anyhow::{Context, Result};
use pagesync_core::{MemoryStore, Orchestrator};
use std::path::Path;

use super::load_config;
use crate::cli::PreviewArgs;
use crate::output::{self, OutputFormat, PreviewView};

/// Fetch one page and show what it would become, without writing anything.
pub async fn preview(args: &PreviewArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, None)?;
    let orchestrator = Orchestrator::new(&config, MemoryStore::new())?;

    let record = orchestrator
        .preview_page(&args.url)
        .await
        .with_context(|| format!("previewing {}", args.url))?;

    match args.format {
        OutputFormat::Json => println!("{}", output::json(&PreviewView::new(&record))?),
        OutputFormat::Text => print!("{}", output::preview_text(&record)),
    }
    Ok(())
}
