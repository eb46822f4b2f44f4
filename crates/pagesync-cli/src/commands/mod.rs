//! Command implementations.

mod discover;
mod preview;
mod sync;

pub use discover::discover;
pub use preview::preview;
pub use sync::sync;

use anyhow::{Context, Result};
use pagesync_core::Config;
use std::path::Path;

use crate::cli::DiscoveryArgs;

/// Load configuration and apply command-line overrides.
pub fn load_config(path: Option<&Path>, discovery: Option<&DiscoveryArgs>) -> Result<Config> {
    let mut config = Config::load(path).context("loading configuration")?;

    if let Some(args) = discovery {
        if let Some(mode) = args.mode {
            config.discovery.mode = mode.into();
        }
        if let Some(max_pages) = args.max_pages {
            config.discovery.max_pages = max_pages;
        }
    }

    config.validate()?;
    Ok(config)
}
