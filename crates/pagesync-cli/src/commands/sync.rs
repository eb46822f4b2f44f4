use anyhow::{Context, Result, anyhow};
use pagesync_core::discovery::read_url_list;
use pagesync_core::{MemoryStore, NotionClient, Orchestrator, RemoteStore, SyncReport};
use std::path::Path;
use tracing::{info, warn};

use super::load_config;
use crate::cli::SyncArgs;
use crate::error::CliError;
use crate::output::{self, OutputFormat};

/// Mirror a site into its Notion database.
///
/// With `--dry-run` pages go to an in-memory store and no token is needed.
pub async fn sync(args: &SyncArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, Some(&args.discovery))?;

    let urls = match &args.urls_file {
        Some(path) => Some(
            read_url_list(path)
                .with_context(|| format!("reading URL list {}", path.display()))?,
        ),
        None => None,
    };

    let report = if args.dry_run {
        let orchestrator = Orchestrator::new(&config, MemoryStore::new())?;
        run(&orchestrator, args, urls.as_deref()).await?
    } else {
        let client = NotionClient::new(&config.notion, &config.sync)?;
        let orchestrator = Orchestrator::new(&config, client)?;
        run(&orchestrator, args, urls.as_deref()).await?
    };

    match args.discovery.format {
        OutputFormat::Json => println!("{}", output::json(&report)?),
        OutputFormat::Text => print!("{}", output::sync_report_text(&report, args.dry_run)),
    }

    if !report.is_complete() {
        warn!(failed = report.failures.len(), "some pages were not synced");
        if args.fail_on_error {
            return Err(CliError::partial_failure(anyhow!(
                "{} of {} pages failed to sync",
                report.failures.len(),
                report.failures.len() + report.synced.len()
            ))
            .into());
        }
    }
    Ok(())
}

async fn run<S: RemoteStore>(
    orchestrator: &Orchestrator<S>,
    args: &SyncArgs,
    urls: Option<&[String]>,
) -> Result<SyncReport> {
    let site = &args.discovery.site;
    let report = match urls {
        Some(urls) => {
            info!(count = urls.len(), "syncing URL list");
            orchestrator.sync_urls(site, urls).await
        },
        None => orchestrator.sync_site(site, args.discovery.sitemap.as_ref()).await,
    }
    .with_context(|| format!("syncing {site}"))?;

    info!(
        synced = report.synced.len(),
        placeholders = report.placeholders.len(),
        failed = report.failures.len(),
        "sync finished"
    );
    Ok(report)
}
