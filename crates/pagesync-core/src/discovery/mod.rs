//! Page discovery for GitHub Pages sites.
//!
//! Produces the list of page URLs a sync run will process, from one of three
//! sources:
//!
//! - **Sitemap**: `<root>/sitemap.xml` or an explicit sitemap URL, including
//!   sitemap indexes
//! - **Crawl**: breadth-first link crawl from the site root
//! - **List**: an explicit URL list supplied by the caller
//!
//! Every URL is canonicalised (no fragment or query, `index.html` folded into
//! its directory) and deduplicated by [`PagePath`] key before it is returned.
//!
//! ```rust
//! use pagesync_core::discovery::{canonicalize, normalize_root};
//! use url::Url;
//!
//! let root = normalize_root(&Url::parse("https://octo.github.io/site")?);
//! assert_eq!(root.as_str(), "https://octo.github.io/site/");
//!
//! let page = canonicalize(&Url::parse("https://octo.github.io/site/docs/index.html#top")?);
//! assert_eq!(page.as_str(), "https://octo.github.io/site/docs/");
//! # Ok::<(), url::ParseError>(())
//! ```

mod crawl;
mod links;
pub mod sitemap;

pub use crawl::{CrawlOutcome, Crawler};
pub use links::extract_links;
pub use sitemap::SitemapEntry;

use crate::config::DiscoveryConfig;
use crate::fetcher::{FetchedPage, Fetcher};
use crate::hierarchy::PagePath;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use url::Url;

/// Discovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Sitemap when it lists pages under the root, crawl otherwise.
    #[default]
    Auto,
    /// Sitemap only.
    Sitemap,
    /// Breadth-first link crawl only.
    Crawl,
}

impl DiscoveryMode {
    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Sitemap => "sitemap",
            Self::Crawl => "crawl",
        }
    }
}

impl fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sitemap" => Ok(Self::Sitemap),
            "crawl" => Ok(Self::Crawl),
            other => Err(Error::Config(format!(
                "unknown discovery mode '{other}' (expected auto, sitemap or crawl)"
            ))),
        }
    }
}

/// Where a discovered URL list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverySource {
    /// `sitemap.xml`.
    Sitemap,
    /// Link crawl.
    Crawl,
    /// Caller-supplied list.
    List,
}

impl fmt::Display for DiscoverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sitemap => "sitemap",
            Self::Crawl => "crawl",
            Self::List => "list",
        })
    }
}

/// A page URL found during discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredPage {
    /// Canonical page URL.
    pub url: Url,
    /// Position under the site root.
    pub path: PagePath,
    /// Response already fetched while crawling, reused by the sync.
    pub prefetched: Option<FetchedPage>,
}

/// A URL discovery could not use.
#[derive(Debug)]
pub struct DiscoveryFailure {
    /// URL as it was found.
    pub url: String,
    /// Why it was dropped.
    pub error: Error,
}

/// Result of discovering a site.
#[derive(Debug)]
pub struct Discovery {
    /// Normalised site root.
    pub root: Url,
    /// Source of the page list.
    pub source: DiscoverySource,
    /// Pages in discovery order, deduplicated by path.
    pub pages: Vec<DiscoveredPage>,
    /// URLs that were found but could not be used.
    pub failures: Vec<DiscoveryFailure>,
}

/// Strip the fragment and query, and fold a trailing `index.html` or
/// `index.htm` into its directory.
pub fn canonicalize(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url.set_query(None);

    let path = url.path().to_string();
    for index in ["index.html", "index.htm"] {
        if let Some(dir) = path.strip_suffix(index) {
            if dir.ends_with('/') {
                url.set_path(dir);
                break;
            }
        }
    }
    url
}

/// Canonicalise a site root and make its path a directory.
///
/// A last segment without a dot gets a trailing slash; a file name is
/// dropped so the root is its directory.
pub fn normalize_root(url: &Url) -> Url {
    let mut root = canonicalize(url);
    let path = root.path().to_string();
    if path.ends_with('/') {
        return root;
    }

    let (dir, last) = path.rsplit_once('/').unwrap_or(("", path.as_str()));
    if last.contains('.') {
        root.set_path(&format!("{dir}/"));
    } else {
        root.set_path(&format!("{path}/"));
    }
    root
}

/// Best-guess site root for a lone page URL.
///
/// Project sites on `*.github.io` live under their first path segment; any
/// other host is rooted at `/`.
pub fn site_root_of(url: &Url) -> Url {
    let mut root = url.clone();
    root.set_fragment(None);
    root.set_query(None);

    let project = url
        .host_str()
        .is_some_and(|host| host.ends_with(".github.io"))
        .then(|| {
            url.path_segments()
                .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        })
        .flatten()
        .filter(|first| !first.contains('.'));

    match project {
        Some(first) => root.set_path(&format!("/{first}/")),
        None => root.set_path("/"),
    }
    root
}

/// Parse a URL list: one URL per line, `#` comments and blank lines ignored.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split_once('#').map_or(line, |(before, _)| before).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read a URL list file.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_url_list(&text))
}

fn has_skipped_extension(url: &Url, skip: &[String]) -> bool {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| last.rsplit_once('.'))
        .is_some_and(|(_, ext)| skip.iter().any(|s| s.eq_ignore_ascii_case(ext)))
}

/// Builds [`DiscoveredPage`] lists, enforcing the root and the page cap.
struct PageCollector {
    root: Url,
    max_pages: usize,
    seen: HashSet<String>,
    pages: Vec<DiscoveredPage>,
    failures: Vec<DiscoveryFailure>,
}

impl PageCollector {
    fn new(root: &Url, max_pages: usize) -> Self {
        Self {
            root: root.clone(),
            max_pages,
            seen: HashSet::new(),
            pages: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.pages.len() >= self.max_pages
    }

    fn push_raw(&mut self, raw: &str) {
        match Url::parse(raw).or_else(|_| self.root.join(raw)) {
            Ok(url) => self.push(&url, None),
            Err(err) => self.failures.push(DiscoveryFailure {
                url: raw.to_string(),
                error: err.into(),
            }),
        }
    }

    fn push(&mut self, url: &Url, prefetched: Option<FetchedPage>) {
        if self.is_full() {
            return;
        }
        let url = canonicalize(url);
        match PagePath::resolve(&self.root, &url) {
            Ok(path) => {
                if self.seen.insert(path.key()) {
                    self.pages.push(DiscoveredPage {
                        url,
                        path,
                        prefetched,
                    });
                }
            },
            Err(error) => self.failures.push(DiscoveryFailure {
                url: url.to_string(),
                error,
            }),
        }
    }

    fn finish(self, source: DiscoverySource) -> Discovery {
        Discovery {
            root: self.root,
            source,
            pages: self.pages,
            failures: self.failures,
        }
    }
}

/// Finds the pages of a site.
pub struct Discoverer {
    fetcher: Fetcher,
    config: DiscoveryConfig,
}

impl Discoverer {
    /// Discoverer using `fetcher` for every request.
    pub fn new(fetcher: Fetcher, config: DiscoveryConfig) -> Self {
        Self { fetcher, config }
    }

    /// Fetch the site root once, following redirects, and normalise the
    /// final URL.
    ///
    /// A root that cannot be fetched is normalised as given; the crawl then
    /// reports the failure.
    pub async fn resolve_root(&self, site: &Url) -> (Url, Option<FetchedPage>) {
        match self.fetcher.fetch_page(site).await {
            Ok(page) => {
                let root = normalize_root(&page.final_url);
                if root != normalize_root(site) {
                    info!(from = %site, to = %root, "site root redirected");
                }
                (root, Some(page))
            },
            Err(err) => {
                warn!(url = %site, error = %err, "could not fetch site root");
                (normalize_root(site), None)
            },
        }
    }

    /// Discover pages using the configured mode.
    ///
    /// `sitemap` overrides the default `<root>/sitemap.xml` location.
    pub async fn discover(&self, site: &Url, sitemap: Option<&Url>) -> Result<Discovery> {
        let (root, root_page) = self.resolve_root(site).await;
        let sitemap_url = match sitemap {
            Some(url) => url.clone(),
            None => root.join("sitemap.xml")?,
        };

        match self.config.mode {
            DiscoveryMode::Sitemap => self.from_sitemap(&root, &sitemap_url).await,
            DiscoveryMode::Crawl => Ok(self.crawl(&root, root_page).await),
            DiscoveryMode::Auto => match self.from_sitemap(&root, &sitemap_url).await {
                Ok(found) if !found.pages.is_empty() => Ok(found),
                Ok(_) => {
                    debug!(root = %root, "sitemap lists no pages under root, crawling");
                    Ok(self.crawl(&root, root_page).await)
                },
                Err(err) => {
                    debug!(root = %root, error = %err, "no usable sitemap, crawling");
                    Ok(self.crawl(&root, root_page).await)
                },
            },
        }
    }

    /// Use an explicit URL list, bypassing discovery.
    ///
    /// Relative entries resolve against the root. Entries outside the root
    /// are reported as failures.
    pub async fn from_list(&self, site: &Url, urls: &[String]) -> Discovery {
        let (root, root_page) = self.resolve_root(site).await;
        let mut collector = PageCollector::new(&root, self.config.max_pages);
        for raw in urls {
            collector.push_raw(raw);
        }
        if let Some(page) = root_page {
            if let Some(entry) = collector.pages.iter_mut().find(|p| p.path.is_root()) {
                entry.prefetched = Some(page);
            }
        }
        collector.finish(DiscoverySource::List)
    }

    async fn from_sitemap(&self, root: &Url, sitemap_url: &Url) -> Result<Discovery> {
        let entries = sitemap::fetch_sitemap(&self.fetcher, sitemap_url).await?;
        let mut collector = PageCollector::new(root, self.config.max_pages);
        for entry in entries {
            match Url::parse(&entry.url) {
                Ok(url) if has_skipped_extension(&url, &self.config.skip_extensions) => {
                    debug!(url = %url, "skipping non-page sitemap entry");
                },
                // Sitemaps often cover the whole host
                Ok(url) if PagePath::resolve(root, &url).is_err() => {
                    debug!(url = %url, "skipping sitemap entry outside root");
                },
                Ok(url) => collector.push(&url, None),
                Err(err) => collector.failures.push(DiscoveryFailure {
                    url: entry.url.clone(),
                    error: err.into(),
                }),
            }
        }
        info!(sitemap = %sitemap_url, pages = collector.pages.len(), "sitemap discovery");
        Ok(collector.finish(DiscoverySource::Sitemap))
    }

    async fn crawl(&self, root: &Url, root_page: Option<FetchedPage>) -> Discovery {
        let crawler = Crawler::new(
            self.fetcher.clone(),
            root.clone(),
            self.config.max_pages,
            self.config.skip_extensions.clone(),
        );
        let outcome = crawler.crawl(root_page).await;

        let mut collector = PageCollector::new(root, self.config.max_pages);
        for (url, page) in outcome.pages {
            collector.push(&url, Some(page));
        }
        collector.failures.extend(outcome.failures);
        collector.finish(DiscoverySource::Crawl)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(
            format!("<html><body>{body}</body></html>"),
            "text/html; charset=utf-8",
        )
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(
            canonicalize(&url("https://o.github.io/s/docs/index.html?x=1#top")).as_str(),
            "https://o.github.io/s/docs/"
        );
        assert_eq!(
            canonicalize(&url("https://o.github.io/s/a.html#x")).as_str(),
            "https://o.github.io/s/a.html"
        );
        // "myindex.html" is a page, not a directory index
        assert_eq!(
            canonicalize(&url("https://o.github.io/s/myindex.html")).as_str(),
            "https://o.github.io/s/myindex.html"
        );
    }

    #[test]
    fn test_normalize_root() {
        assert_eq!(
            normalize_root(&url("https://o.github.io/site")).as_str(),
            "https://o.github.io/site/"
        );
        assert_eq!(
            normalize_root(&url("https://o.github.io/site/index.html")).as_str(),
            "https://o.github.io/site/"
        );
        assert_eq!(
            normalize_root(&url("https://o.github.io/site/home.html")).as_str(),
            "https://o.github.io/site/"
        );
        assert_eq!(normalize_root(&url("https://docs.example.com")).as_str(), "https://docs.example.com/");
    }

    #[test]
    fn test_site_root_of() {
        let root = |s: &str| site_root_of(&url(s)).to_string();
        assert_eq!(root("https://o.github.io/repo/guide/a.html"), "https://o.github.io/repo/");
        assert_eq!(root("https://o.github.io/repo/"), "https://o.github.io/repo/");
        assert_eq!(root("https://o.github.io/about.html"), "https://o.github.io/");
        assert_eq!(root("https://docs.example.com/guide/a.html?x#y"), "https://docs.example.com/");
    }

    #[test]
    fn test_parse_url_list() {
        let text = "# pages\nhttps://o.github.io/s/\n\n  https://o.github.io/s/a.html  # first\n#skip\n";
        assert_eq!(
            parse_url_list(text),
            vec!["https://o.github.io/s/", "https://o.github.io/s/a.html"]
        );
    }

    #[test]
    fn test_read_url_list_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("urls.txt");
        std::fs::write(&file, "https://o.github.io/s/\n# c\n").unwrap();
        assert_eq!(read_url_list(&file).unwrap(), vec!["https://o.github.io/s/"]);
        assert!(read_url_list(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Crawl".parse::<DiscoveryMode>().unwrap(), DiscoveryMode::Crawl);
        assert!("spider".parse::<DiscoveryMode>().is_err());
        assert_eq!(DiscoveryMode::default().to_string(), "auto");
    }

    #[test]
    fn test_collector_dedupes_and_caps() {
        let root = url("https://o.github.io/s/");
        let mut collector = PageCollector::new(&root, 3);
        collector.push_raw("https://o.github.io/s/docs");
        collector.push_raw("https://o.github.io/s/docs/index.html");
        collector.push_raw("a.html");
        collector.push_raw("https://other.example.com/x");
        collector.push_raw("https://o.github.io/s/b.html");
        collector.push_raw("https://o.github.io/s/c.html");

        let found = collector.finish(DiscoverySource::List);
        let keys: Vec<_> = found.pages.iter().map(|p| p.path.key()).collect();
        assert_eq!(keys, vec!["docs", "a.html", "b.html"]);
        assert_eq!(found.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_prefers_sitemap() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/site/"))
            .respond_with(html("home"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/site/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                  <url><loc>{base}/site/</loc></url>
                  <url><loc>{base}/site/guide/</loc></url>
                  <url><loc>{base}/other/ignored.html</loc></url>
                  <url><loc>{base}/site/manual.pdf</loc></url>
                </urlset>"#
            )))
            .mount(&server)
            .await;

        let discoverer = Discoverer::new(Fetcher::new().unwrap(), DiscoveryConfig::default());
        let found = discoverer
            .discover(&url(&format!("{base}/site")), None)
            .await
            .unwrap();

        assert_eq!(found.source, DiscoverySource::Sitemap);
        assert_eq!(found.root.as_str(), format!("{base}/site/"));
        let keys: Vec<_> = found.pages.iter().map(|p| p.path.key()).collect();
        assert_eq!(keys, vec!["", "guide"]);
        assert!(found.failures.is_empty());
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_crawl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site/"))
            .respond_with(html(r#"<a href="a.html">A</a>"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/site/a.html"))
            .respond_with(html("leaf"))
            .mount(&server)
            .await;

        let discoverer = Discoverer::new(Fetcher::new().unwrap(), DiscoveryConfig::default());
        let found = discoverer
            .discover(&url(&format!("{}/site/", server.uri())), None)
            .await
            .unwrap();

        assert_eq!(found.source, DiscoverySource::Crawl);
        assert_eq!(found.pages.len(), 2);
        assert!(found.pages.iter().all(|p| p.prefetched.is_some()));
    }

    #[tokio::test]
    async fn test_sitemap_mode_fails_without_sitemap() {
        let server = MockServer::start().await;
        let config = DiscoveryConfig {
            mode: DiscoveryMode::Sitemap,
            ..DiscoveryConfig::default()
        };
        let discoverer = Discoverer::new(Fetcher::new().unwrap(), config);
        let result = discoverer
            .discover(&url(&format!("{}/site/", server.uri())), None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_from_list_reuses_root_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site/"))
            .respond_with(html("home"))
            .expect(1)
            .mount(&server)
            .await;

        let discoverer = Discoverer::new(Fetcher::new().unwrap(), DiscoveryConfig::default());
        let base = server.uri();
        let found = discoverer
            .from_list(
                &url(&format!("{base}/site/")),
                &[format!("{base}/site/"), "guide/".to_string()],
            )
            .await;

        assert_eq!(found.source, DiscoverySource::List);
        assert_eq!(found.pages.len(), 2);
        assert!(found.pages[0].prefetched.is_some());
        assert!(found.pages[1].prefetched.is_none());
    }
}
