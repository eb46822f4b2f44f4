//! # CLI Structure and Argument Parsing
//!
//! Command-line interface for `pagesync`, built on `clap` derive macros.
//!
//! ```bash
//! # Mirror a whole site
//! pagesync sync https://octo.github.io/handbook/
//!
//! # Only the pages in a list, without touching Notion
//! pagesync sync https://octo.github.io/handbook/ --urls-file pages.txt --dry-run
//!
//! # Inspect what one page would become
//! pagesync preview https://octo.github.io/handbook/guide/setup.html
//!
//! # List the pages a sync would visit
//! pagesync discover https://octo.github.io/handbook/ --mode crawl --format json
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use pagesync_core::DiscoveryMode;
use std::path::PathBuf;
use url::Url;

use crate::output::OutputFormat;

/// Main CLI structure for the `pagesync` command.
#[derive(Parser, Clone, Debug)]
#[command(name = "pagesync")]
#[command(version)]
#[command(about = "pagesync - mirror GitHub Pages sites into Notion", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show debug logs
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress informational messages (only show errors)
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file (overrides `PAGESYNC_CONFIG` and autodiscovery)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long = "json-logs", global = true)]
    pub json_logs: bool,

    /// Disable all ANSI colors in output (also respects `NO_COLOR` env)
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Mirror a site into its Notion database
    Sync(SyncArgs),

    /// Fetch one page and show its classification and blocks
    Preview(PreviewArgs),

    /// List the pages a sync would visit
    Discover(DiscoverArgs),
}

impl Commands {
    /// Output format selected for the command.
    pub const fn format(&self) -> OutputFormat {
        match self {
            Self::Sync(args) => args.discovery.format,
            Self::Preview(args) => args.format,
            Self::Discover(args) => args.discovery.format,
        }
    }
}

/// Discovery options shared by `sync` and `discover`.
#[derive(Args, Clone, Debug)]
pub struct DiscoveryArgs {
    /// Root URL of the GitHub Pages site
    #[arg(value_name = "SITE_URL")]
    pub site: Url,

    /// Sitemap to read instead of `<root>/sitemap.xml`
    #[arg(long, value_name = "URL")]
    pub sitemap: Option<Url>,

    /// How to find pages (defaults to `discovery.mode` from config)
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Stop after this many pages (defaults to `discovery.max_pages`)
    #[arg(long, value_name = "N")]
    pub max_pages: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,

    /// Sync exactly the URLs in this file (one per line, `#` comments)
    #[arg(long, value_name = "FILE", conflicts_with_all = ["sitemap", "mode"])]
    pub urls_file: Option<PathBuf>,

    /// Write to an in-memory store instead of Notion
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with code 4 when any page fails
    #[arg(long)]
    pub fail_on_error: bool,
}

#[derive(Args, Clone, Debug)]
pub struct PreviewArgs {
    /// Page to preview
    #[arg(value_name = "PAGE_URL")]
    pub url: Url,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Clone, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub discovery: DiscoveryArgs,
}

/// Discovery mode as accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Sitemap when it lists pages, crawl otherwise
    Auto,
    /// Sitemap only
    Sitemap,
    /// Link crawl only
    Crawl,
}

impl From<ModeArg> for DiscoveryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => Self::Auto,
            ModeArg::Sitemap => Self::Sitemap,
            ModeArg::Crawl => Self::Crawl,
        }
    }
}
