use anyhow::{Context, Result};
use pagesync_core::{Discoverer, Fetcher};
use tracing::info;

use super::load_config;
use crate::cli::DiscoverArgs;
use crate::output::{self, DiscoveryView, OutputFormat};

/// List the pages a sync of the site would visit.
pub async fn discover(args: &DiscoverArgs, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = load_config(config_path, Some(&args.discovery))?;
    let fetcher = Fetcher::from_config(&config.fetch)?;
    let discoverer = Discoverer::new(fetcher, config.discovery.clone());

    let discovery = discoverer
        .discover(&args.discovery.site, args.discovery.sitemap.as_ref())
        .await
        .with_context(|| format!("discovering {}", args.discovery.site))?;
    info!(
        pages = discovery.pages.len(),
        source = %discovery.source,
        "discovery finished"
    );

    let view = DiscoveryView::new(&discovery);
    match args.discovery.format {
        OutputFormat::Json => println!("{}", output::json(&view)?),
        OutputFormat::Text => print!("{}", view.to_text()),
    }
    Ok(())
}
