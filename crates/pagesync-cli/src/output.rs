//! # Output Formatting
//!
//! Every command renders either human-readable text or a single JSON
//! document on stdout. Logs always go to stderr, so `--format json` output
//! can be piped straight into `jq`.

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use pagesync_core::blocks::Block;
use pagesync_core::{BlockKind, ContentType, Discovery, DiscoverySource, PageRecord, SyncReport};
use serde::Serialize;
use std::fmt::Write as _;

/// Widest block text shown in previews.
const PREVIEW_WIDTH: usize = 72;

/// Output format for command results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// A single JSON document
    Json,
}

impl OutputFormat {
    /// Whether the format is meant for machines.
    pub const fn is_machine(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Content type label, padded to `width`, in the colour Notion shows for
/// its select option.
fn content_type_label(content_type: ContentType, width: usize) -> ColoredString {
    let label = format!("{:<width$}", content_type.as_str());
    match content_type {
        ContentType::Notebook => label.blue(),
        ContentType::HtmlPage => label.green(),
        ContentType::Index => label.magenta(),
    }
}

fn truncate(text: &str, width: usize) -> String {
    let text = text.replace('\n', " ");
    if text.chars().count() <= width {
        return text;
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn block_label(block: &Block) -> String {
    match &block.kind {
        BlockKind::Heading { level } => format!("heading_{level}"),
        BlockKind::Code {
            language: Some(language),
        } => format!("code ({language})"),
        BlockKind::ListItem { ordered, depth } => {
            let kind = if *ordered { "numbered" } else { "bulleted" };
            if *depth > 0 {
                format!("{kind} (nested)")
            } else {
                kind.to_string()
            }
        },
        kind => kind.name().to_string(),
    }
}

fn block_text(block: &Block) -> String {
    match &block.kind {
        BlockKind::Image { url } => url.clone(),
        BlockKind::Equation { expression } => expression.clone(),
        _ => block.text.plain_text(),
    }
}

/// Text rendering of a sync report.
#[allow(clippy::cast_precision_loss)]
pub fn sync_report_text(report: &SyncReport, dry_run: bool) -> String {
    let mut out = String::new();
    let elapsed = report.finished_at - report.started_at;
    let mode = if dry_run { " (dry run)" } else { "" };

    let _ = writeln!(
        out,
        "{} {} pages into {}{mode} from {} in {:.1}s",
        "Synced".green().bold(),
        report.synced.len(),
        report.database_title.bold(),
        report.root,
        elapsed.num_milliseconds() as f64 / 1000.0,
    );

    for page in &report.synced {
        let action = if page.created { "+" } else { "~" };
        let _ = writeln!(
            out,
            "  {} {:<40} {} depth {}  {} blocks in {} batch(es)",
            action.green(),
            page.path.to_string(),
            content_type_label(page.content_type, 10),
            page.depth,
            page.blocks,
            page.batches,
        );
        if page.mapping_issues > 0 {
            let _ = writeln!(
                out,
                "      {} {} element(s) skipped",
                "!".yellow(),
                page.mapping_issues
            );
        }
    }

    if !report.placeholders.is_empty() {
        let _ = writeln!(out, "{}", "Placeholders".yellow().bold());
        for placeholder in &report.placeholders {
            let _ = writeln!(out, "  {} {}", "?".yellow(), placeholder.path);
        }
    }

    if !report.failures.is_empty() {
        let _ = writeln!(
            out,
            "{} {}",
            "Failed".red().bold(),
            report.failures.len()
        );
        for failure in &report.failures {
            let _ = writeln!(
                out,
                "  {} {} [{}/{}] {}",
                "x".red(),
                failure.url,
                failure.stage,
                failure.category,
                failure.error.as_str().dimmed(),
            );
        }
    }

    out
}

/// JSON view of a previewed page.
#[derive(Serialize)]
pub struct PreviewView<'a> {
    #[serde(flatten)]
    record: &'a PageRecord,
    checksum: String,
}

impl<'a> PreviewView<'a> {
    pub fn new(record: &'a PageRecord) -> Self {
        Self {
            record,
            checksum: record.checksum(),
        }
    }
}

/// Text rendering of a previewed page.
pub fn preview_text(record: &PageRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", record.title.bold());
    let _ = writeln!(out, "  url:    {}", record.url);
    let _ = writeln!(
        out,
        "  type:   {} ({})",
        content_type_label(record.content_type, 0),
        record.classification_reason.as_str().dimmed()
    );
    let parent = record
        .parent
        .as_ref()
        .map_or_else(|| "-".to_string(), ToString::to_string);
    let _ = writeln!(
        out,
        "  path:   {}  depth {}  parent {}",
        record.path, record.depth, parent
    );
    let _ = writeln!(out, "  blocks: {}", record.blocks.len());

    for (index, block) in record.blocks.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:>3}. {} {}",
            index + 1,
            format!("{:<20}", block_label(block)).cyan(),
            truncate(&block_text(block), PREVIEW_WIDTH)
        );
    }

    for issue in &record.issues {
        let _ = writeln!(
            out,
            "  {} <{}> {}",
            "skipped".yellow(),
            issue.element,
            issue.reason
        );
    }
    out
}

/// One discovered page.
#[derive(Serialize)]
pub struct DiscoveredView {
    url: String,
    path: String,
    depth: usize,
    parent: Option<String>,
}

/// A URL discovery dropped.
#[derive(Serialize)]
pub struct DiscoveryFailureView {
    url: String,
    category: &'static str,
    error: String,
}

/// JSON view of a discovery run.
#[derive(Serialize)]
pub struct DiscoveryView {
    root: String,
    source: DiscoverySource,
    pages: Vec<DiscoveredView>,
    failures: Vec<DiscoveryFailureView>,
}

impl DiscoveryView {
    pub fn new(discovery: &Discovery) -> Self {
        Self {
            root: discovery.root.to_string(),
            source: discovery.source,
            pages: discovery
                .pages
                .iter()
                .map(|page| DiscoveredView {
                    url: page.url.to_string(),
                    path: page.path.to_string(),
                    depth: page.path.depth(),
                    parent: page.path.parent().map(|p| p.to_string()),
                })
                .collect(),
            failures: discovery
                .failures
                .iter()
                .map(|failure| DiscoveryFailureView {
                    url: failure.url.clone(),
                    category: failure.error.category(),
                    error: failure.error.to_string(),
                })
                .collect(),
        }
    }

    /// Text rendering.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} pages under {} via {}",
            "Found".green().bold(),
            self.pages.len(),
            self.root,
            self.source,
        );
        for page in &self.pages {
            let _ = writeln!(
                out,
                "  {:>2}  {:<40} {}",
                page.depth,
                page.path,
                page.url.as_str().dimmed()
            );
        }
        for failure in &self.failures {
            let _ = writeln!(
                out,
                "  {} {} [{}] {}",
                "x".red(),
                failure.url,
                failure.category,
                failure.error.as_str().dimmed()
            );
        }
        out
    }
}

/// Serialize a value as pretty JSON.
pub fn json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
