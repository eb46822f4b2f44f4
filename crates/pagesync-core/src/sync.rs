//! Sync orchestration.
//!
//! The [`Orchestrator`] drives a run end to end: discover page URLs, then for
//! each page fetch, parse, classify, map, resolve its place in the hierarchy
//! and write it to the [`RemoteStore`].
//!
//! ## Ordering
//!
//! Pages are processed breadth-first by depth, shallowest first, keeping
//! discovery order within a depth. A parent is therefore always written
//! before its children. When a parent is missing (never discovered, or its
//! own sync failed) a placeholder page is created in its place so children
//! still nest correctly.
//!
//! ## Failure policy
//!
//! | Failure | Effect |
//! |---|---|
//! | fetch or parse | page skipped, failure recorded |
//! | single element mapping | element skipped, counted on the page |
//! | rate limit / transient remote | retried by the store, then page skipped |
//! | unauthorized / validation / config | run aborted with the error |
//!
//! ```rust,no_run
//! use pagesync_core::{Config, MemoryStore, Orchestrator};
//! use url::Url;
//!
//! # async fn example() -> pagesync_core::Result<()> {
//! let orchestrator = Orchestrator::new(&Config::default(), MemoryStore::new())?;
//! let site = Url::parse("https://octo.github.io/site/")?;
//! let report = orchestrator.sync_site(&site, None).await?;
//! println!("{} synced, {} failed", report.synced.len(), report.failures.len());
//! # Ok(())
//! # }
//! ```

use crate::blocks::{self, Block};
use crate::classify::{Classifier, ContentType};
use crate::config::Config;
use crate::discovery::{
    DiscoveredPage, Discoverer, Discovery, DiscoverySource, canonicalize, site_root_of,
};
use crate::document::{Document, title_from_url};
use crate::fetcher::{FetchedPage, Fetcher};
use crate::hierarchy::{HierarchyMap, PagePath};
use crate::mapper::{BlockMapper, MappingIssue};
use crate::store::{PageProperties, RemoteId, RemoteStore};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Stage of the pipeline where a page failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// HTTP fetch.
    Fetch,
    /// HTML parsing.
    Parse,
    /// Hierarchy resolution.
    Resolve,
    /// Remote store writes.
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Resolve => "resolve",
            Self::Store => "store",
        })
    }
}

/// A page that could not be synced.
#[derive(Debug, Clone, Serialize)]
pub struct PageFailure {
    /// Page URL.
    pub url: String,
    /// Where it failed.
    pub stage: Stage,
    /// Error category, see [`Error::category`].
    pub category: &'static str,
    /// Error message.
    pub error: String,
}

impl PageFailure {
    fn new(url: impl Into<String>, stage: Stage, error: &Error) -> Self {
        Self {
            url: url.into(),
            stage,
            category: error.category(),
            error: error.to_string(),
        }
    }
}

/// Everything known about one page before it is written.
#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    /// Source URL; the page's unique key.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Assigned content type.
    pub content_type: ContentType,
    /// Classification rule that matched.
    pub classification_reason: String,
    /// When the record was built.
    pub last_synced: DateTime<Utc>,
    /// Page content in order.
    pub blocks: Vec<Block>,
    /// Elements skipped while mapping.
    pub issues: Vec<MappingIssue>,
    /// Position under the site root.
    pub path: PagePath,
    /// Number of path segments.
    pub depth: usize,
    /// Parent position, `None` at depth 0.
    pub parent: Option<PagePath>,
}

impl PageRecord {
    /// Checksum of the block sequence.
    pub fn checksum(&self) -> String {
        blocks::checksum(&self.blocks)
    }

    fn properties(&self) -> PageProperties {
        PageProperties {
            title: self.title.clone(),
            url: self.url.clone(),
            last_synced: self.last_synced,
            content_type: self.content_type,
        }
    }
}

/// Outcome for one synced page.
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    /// Source URL.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Assigned content type.
    pub content_type: ContentType,
    /// Number of path segments.
    pub depth: usize,
    /// Position under the site root.
    pub path: PagePath,
    /// Parent position.
    pub parent: Option<PagePath>,
    /// Remote page id.
    pub remote_id: RemoteId,
    /// Blocks written.
    pub blocks: usize,
    /// Append requests issued.
    pub batches: usize,
    /// Elements skipped while mapping.
    pub mapping_issues: usize,
    /// Checksum of the written blocks.
    pub checksum: String,
    /// Whether the page was created rather than updated.
    pub created: bool,
}

/// A stand-in page created for a missing ancestor.
#[derive(Debug, Clone, Serialize)]
pub struct Placeholder {
    /// URL the ancestor would have.
    pub url: String,
    /// Position under the site root.
    pub path: PagePath,
    /// Remote page id.
    pub remote_id: RemoteId,
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Normalised site root.
    pub root: String,
    /// Where the page list came from.
    pub source: DiscoverySource,
    /// Database title.
    pub database_title: String,
    /// Database id.
    pub database_id: RemoteId,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
    /// Synced pages in processing order.
    pub synced: Vec<PageSummary>,
    /// Placeholders created for missing ancestors.
    pub placeholders: Vec<Placeholder>,
    /// Pages that could not be synced.
    pub failures: Vec<PageFailure>,
}

impl SyncReport {
    /// Whether every page synced.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Database title for a site: `<repo>-gh-pages`.
///
/// On `user.github.io/<repo>` the repo is the first path segment; on a bare
/// `user.github.io` it is the user name; on a custom domain it is the host
/// with dots replaced by dashes.
pub fn database_title(root: &Url) -> String {
    let host = root.host_str().unwrap_or("site");
    let first_segment = root
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()));

    let repo = match host.strip_suffix(".github.io") {
        Some(user) => first_segment.unwrap_or(user).to_string(),
        None => host.replace('.', "-"),
    };
    format!("{repo}-gh-pages")
}

struct WriteOutcome {
    id: RemoteId,
    created: bool,
    batches: usize,
}

/// Drives sync runs against a [`RemoteStore`].
pub struct Orchestrator<S: RemoteStore> {
    store: S,
    fetcher: Fetcher,
    discoverer: Discoverer,
    classifier: Classifier,
    mapper: BlockMapper,
    batch_size: usize,
}

impl<S: RemoteStore> Orchestrator<S> {
    /// Build an orchestrator writing to `store`.
    pub fn new(config: &Config, store: S) -> Result<Self> {
        let fetcher = Fetcher::from_config(&config.fetch)?;
        Ok(Self {
            discoverer: Discoverer::new(fetcher.clone(), config.discovery.clone()),
            fetcher,
            store,
            classifier: Classifier::new(&config.classifier),
            mapper: BlockMapper::new(),
            batch_size: config.sync.effective_batch_size(),
        })
    }

    /// The store pages are written to.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Discover the pages of a site without syncing them.
    pub async fn discover(&self, site: &Url, sitemap: Option<&Url>) -> Result<Discovery> {
        self.discoverer.discover(site, sitemap).await
    }

    /// Discover and sync a whole site.
    pub async fn sync_site(&self, site: &Url, sitemap: Option<&Url>) -> Result<SyncReport> {
        let discovery = self.discover(site, sitemap).await?;
        self.sync_discovered(discovery).await
    }

    /// Sync an explicit URL list under a site root.
    pub async fn sync_urls(&self, site: &Url, urls: &[String]) -> Result<SyncReport> {
        let discovery = self.discoverer.from_list(site, urls).await;
        self.sync_discovered(discovery).await
    }

    /// Fetch, parse, classify and map a single page without writing it.
    ///
    /// The hierarchy is resolved against the site root implied by the URL.
    pub async fn preview_page(&self, url: &Url) -> Result<PageRecord> {
        let url = canonicalize(url);
        let root = site_root_of(&url);
        let fetched = self.fetcher.fetch_page(&url).await?;
        self.build_record(&root, &url, &fetched)
            .map_err(|(_, error)| error)
    }

    /// Sync pages that were already discovered.
    ///
    /// Returns the error when a fatal failure stops the run; every other
    /// failure is recorded in the report.
    #[instrument(skip_all, fields(root = %discovery.root, pages = discovery.pages.len()))]
    pub async fn sync_discovered(&self, discovery: Discovery) -> Result<SyncReport> {
        let started_at = Utc::now();
        let Discovery {
            root,
            source,
            mut pages,
            failures,
        } = discovery;

        let database_title = database_title(&root);
        let database_id = self.store.ensure_database(&database_title).await?;
        info!(database = %database_id, title = %database_title, "using database");

        let mut report = SyncReport {
            root: root.to_string(),
            source,
            database_title,
            database_id: database_id.clone(),
            started_at,
            finished_at: started_at,
            synced: Vec::new(),
            placeholders: Vec::new(),
            failures: failures
                .iter()
                .map(|f| PageFailure::new(&f.url, discovery_stage(&f.error), &f.error))
                .collect(),
        };

        // Stable: discovery order is kept within a depth
        pages.sort_by_key(|page| page.path.depth());

        let mut map = HierarchyMap::new();
        for page in pages {
            let url = page.url.to_string();
            let record = match self.prepare(&root, &page).await {
                Ok(record) => record,
                Err((stage, error)) => {
                    warn!(url = %url, stage = %stage, error = %error, "skipping page");
                    report.failures.push(PageFailure::new(&url, stage, &error));
                    continue;
                },
            };

            let written = match self
                .ensure_ancestors(&root, &database_id, &record.path, &mut map, &mut report)
                .await
            {
                Ok(parent) => {
                    self.write_page(&database_id, parent.as_ref(), &record, &map)
                        .await
                },
                Err(error) => Err(error),
            };

            match written {
                Ok(outcome) => {
                    map.insert(&record.path, outcome.id.clone());
                    info!(
                        url = %url,
                        depth = record.depth,
                        blocks = record.blocks.len(),
                        created = outcome.created,
                        "synced page"
                    );
                    report.synced.push(PageSummary {
                        url,
                        title: record.title.clone(),
                        content_type: record.content_type,
                        depth: record.depth,
                        path: record.path.clone(),
                        parent: record.parent.clone(),
                        remote_id: outcome.id,
                        blocks: record.blocks.len(),
                        batches: outcome.batches,
                        mapping_issues: record.issues.len(),
                        checksum: record.checksum(),
                        created: outcome.created,
                    });
                },
                Err(error) if error.is_fatal() => {
                    warn!(url = %url, stage = "store", error = %error, "aborting sync");
                    return Err(error);
                },
                Err(error) => {
                    warn!(url = %url, stage = "store", error = %error, "skipping page");
                    report.failures.push(PageFailure::new(&url, Stage::Store, &error));
                },
            }
        }

        report.finished_at = Utc::now();
        info!(
            synced = report.synced.len(),
            placeholders = report.placeholders.len(),
            failures = report.failures.len(),
            "sync finished"
        );
        Ok(report)
    }

    /// Steps up to and including hierarchy resolution.
    async fn prepare(
        &self,
        root: &Url,
        page: &DiscoveredPage,
    ) -> std::result::Result<PageRecord, (Stage, Error)> {
        let fetched = match &page.prefetched {
            Some(fetched) => fetched.clone(),
            None => self
                .fetcher
                .fetch_page(&page.url)
                .await
                .map_err(|e| (Stage::Fetch, e))?,
        };
        self.build_record(root, &page.url, &fetched)
    }

    /// Parse, classify, map and resolve. Synchronous so the parsed tree never
    /// lives across an await point.
    fn build_record(
        &self,
        root: &Url,
        url: &Url,
        fetched: &FetchedPage,
    ) -> std::result::Result<PageRecord, (Stage, Error)> {
        let path = PagePath::resolve(root, url).map_err(|e| (Stage::Resolve, e))?;
        let doc = Document::parse(&fetched.final_url, &fetched.body).map_err(|e| (Stage::Parse, e))?;

        let classification = self.classifier.classify(&doc);
        let mapped = self.mapper.map(&doc);
        debug!(
            url = %url,
            content_type = %classification.content_type,
            reason = %classification.reason,
            blocks = mapped.blocks.len(),
            issues = mapped.issues.len(),
            "mapped page"
        );

        Ok(PageRecord {
            url: url.to_string(),
            title: doc.title(),
            content_type: classification.content_type,
            classification_reason: classification.reason,
            last_synced: Utc::now(),
            blocks: mapped.blocks,
            issues: mapped.issues,
            depth: path.depth(),
            parent: path.parent(),
            path,
        })
    }

    /// Make sure every ancestor of `path` has a remote page, creating
    /// placeholders shallowest first. Returns the parent's id.
    async fn ensure_ancestors(
        &self,
        root: &Url,
        database: &RemoteId,
        path: &PagePath,
        map: &mut HierarchyMap,
        report: &mut SyncReport,
    ) -> Result<Option<RemoteId>> {
        let Some(parent) = path.parent() else {
            return Ok(None);
        };

        for ancestor in path.ancestors() {
            if map.contains(&ancestor) {
                continue;
            }
            let ancestor_parent = ancestor.parent().and_then(|p| map.get(&p).cloned());
            let url = ancestor.to_url(root)?;
            let props = PageProperties {
                title: title_from_url(&url),
                url: url.to_string(),
                last_synced: Utc::now(),
                content_type: ContentType::Index,
            };

            let id = match self
                .lookup(database, ancestor_parent.as_ref(), &props, &ancestor, map)
                .await?
            {
                Some(id) => id,
                None => {
                    self.store
                        .create_page(database, ancestor_parent.as_ref(), &props)
                        .await?
                },
            };
            info!(url = %url, path = %ancestor, "created placeholder for missing parent");
            map.insert(&ancestor, id.clone());
            report.placeholders.push(Placeholder {
                url: props.url,
                path: ancestor,
                remote_id: id,
            });
        }

        Ok(map.get(&parent).cloned())
    }

    /// Existing remote page for `props.url`, ignoring ids that another path
    /// already holds in this run.
    async fn lookup(
        &self,
        database: &RemoteId,
        parent: Option<&RemoteId>,
        props: &PageProperties,
        path: &PagePath,
        map: &HierarchyMap,
    ) -> Result<Option<RemoteId>> {
        let found = self.store.find_page(database, parent, props).await?;
        Ok(found.filter(|id| match map.claimed_by(id) {
            Some(owner) if owner != path.key() => {
                warn!(
                    url = %props.url,
                    page = %id,
                    owner = %owner,
                    "remote page belongs to another path, creating a new one"
                );
                false
            },
            _ => true,
        }))
    }

    /// Create or update the page, then replace its content batch by batch.
    async fn write_page(
        &self,
        database: &RemoteId,
        parent: Option<&RemoteId>,
        record: &PageRecord,
        map: &HierarchyMap,
    ) -> Result<WriteOutcome> {
        let props = record.properties();
        let (id, created) = match self
            .lookup(database, parent, &props, &record.path, map)
            .await?
        {
            Some(id) => {
                self.store.update_page(&id, parent, &props).await?;
                self.store.clear_content(&id).await?;
                (id, false)
            },
            None => (self.store.create_page(database, parent, &props).await?, true),
        };

        let batches = blocks::batches(&record.blocks, self.batch_size);
        for (index, batch) in batches.iter().enumerate() {
            debug!(page = %id, batch = index, size = batch.len(), "appending blocks");
            self.store.append_blocks(&id, batch).await?;
        }

        Ok(WriteOutcome {
            id,
            created,
            batches: batches.len(),
        })
    }
}

fn discovery_stage(error: &Error) -> Stage {
    match error {
        Error::InvalidUrl(_) => Stage::Resolve,
        Error::Parse(_) => Stage::Parse,
        _ => Stage::Fetch,
    }
}
