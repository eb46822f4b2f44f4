//! Sitemap XML parsing.
//!
//! Handles both standard sitemaps (`<urlset>` of `<url>` entries) and sitemap
//! indexes (`<sitemapindex>` of `<sitemap>` entries pointing at further
//! sitemaps). Indexes are followed recursively up to [`MAX_INDEX_DEPTH`]
//! levels and [`MAX_CHILD_SITEMAPS`] children per index.
//!
//! ```
//! use pagesync_core::discovery::sitemap::parse_sitemap;
//!
//! let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url><loc>https://octo.github.io/site/guide/</loc><lastmod>2024-01-15</lastmod></url>
//! </urlset>"#;
//!
//! let sitemap = parse_sitemap(xml)?;
//! assert_eq!(sitemap.entries.len(), 1);
//! assert!(sitemap.children.is_empty());
//! # Ok::<(), pagesync_core::Error>(())
//! ```

use crate::fetcher::Fetcher;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, instrument, warn};
use url::Url;

/// Maximum recursion depth for sitemap indexes.
pub const MAX_INDEX_DEPTH: u8 = 2;

/// Maximum number of child sitemaps followed from one index.
pub const MAX_CHILD_SITEMAPS: usize = 50;

/// One page listed in a sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitemapEntry {
    /// Page URL as listed.
    pub url: String,
    /// Last modification date, when present and parseable.
    pub lastmod: Option<DateTime<Utc>>,
}

/// Parsed contents of one sitemap document.
#[derive(Debug, Default)]
pub struct Sitemap {
    /// Pages listed by a `<urlset>`.
    pub entries: Vec<SitemapEntry>,
    /// Child sitemap locations listed by a `<sitemapindex>`.
    pub children: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Container {
    Url,
    Sitemap,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    Lastmod,
}

/// Parse a sitemap or sitemap index document.
#[instrument(skip(xml), fields(xml_len = xml.len()))]
pub fn parse_sitemap(xml: &str) -> Result<Sitemap> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut sitemap = Sitemap::default();
    let mut container: Option<Container> = None;
    let mut field: Option<Field> = None;
    let mut loc: Option<String> = None;
    let mut lastmod: Option<DateTime<Utc>> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"urlset" | b"sitemapindex" => saw_root = true,
                b"url" => {
                    container = Some(Container::Url);
                    loc = None;
                    lastmod = None;
                },
                b"sitemap" => {
                    container = Some(Container::Sitemap);
                    loc = None;
                    lastmod = None;
                },
                b"loc" if container.is_some() => field = Some(Field::Loc),
                b"lastmod" if container.is_some() => field = Some(Field::Lastmod),
                _ => {},
            },
            Ok(Event::End(e)) => {
                match (e.local_name().as_ref(), container) {
                    (b"url", Some(Container::Url)) => {
                        if let Some(url) = loc.take() {
                            sitemap.entries.push(SitemapEntry {
                                url,
                                lastmod: lastmod.take(),
                            });
                        }
                        container = None;
                    },
                    (b"sitemap", Some(Container::Sitemap)) => {
                        if let Some(url) = loc.take() {
                            sitemap.children.push(url);
                        }
                        container = None;
                    },
                    _ => {},
                }
                field = None;
            },
            Ok(Event::Text(e)) => {
                if let Some(current) = field {
                    let text = e.unescape().map_err(|e| Error::Parse(e.to_string()))?;
                    let text = text.trim();
                    match current {
                        Field::Loc => loc = Some(text.to_string()),
                        Field::Lastmod => lastmod = parse_lastmod(text),
                    }
                }
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Parse(format!("sitemap XML error: {e}"))),
            _ => {},
        }
    }

    if !saw_root {
        return Err(Error::Parse(
            "document is neither a urlset nor a sitemapindex".into(),
        ));
    }
    Ok(sitemap)
}

/// Fetch a sitemap and every child sitemap it indexes.
///
/// Child sitemaps that fail to load are logged and skipped. A failure on
/// the top-level sitemap is returned.
#[instrument(skip(fetcher), fields(url = %url))]
pub async fn fetch_sitemap(fetcher: &Fetcher, url: &Url) -> Result<Vec<SitemapEntry>> {
    fetch_recursive(fetcher.clone(), url.clone(), 0).await
}

fn fetch_recursive(
    fetcher: Fetcher,
    url: Url,
    depth: u8,
) -> Pin<Box<dyn Future<Output = Result<Vec<SitemapEntry>>> + Send>> {
    Box::pin(async move {
        if depth > MAX_INDEX_DEPTH {
            return Err(Error::Parse(format!(
                "sitemap index nesting deeper than {MAX_INDEX_DEPTH} at {url}"
            )));
        }

        debug!(url = %url, depth, "fetching sitemap");
        let xml = fetcher.fetch_text(&url).await?;
        let sitemap = parse_sitemap(&xml)?;
        let mut entries = sitemap.entries;

        let children: Vec<Url> = sitemap
            .children
            .iter()
            .take(MAX_CHILD_SITEMAPS)
            .filter_map(|loc| url.join(loc).ok())
            .collect();
        if children.is_empty() {
            return Ok(entries);
        }

        debug!(children = children.len(), "following sitemap index");
        let handles: Vec<_> = children
            .into_iter()
            .map(|child| tokio::spawn(fetch_recursive(fetcher.clone(), child, depth + 1)))
            .collect();

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(Ok(child_entries)) => entries.extend(child_entries),
                Ok(Err(e)) => warn!(error = %e, "failed to fetch child sitemap"),
                Err(e) => warn!(error = %e, "child sitemap task panicked"),
            }
        }
        Ok(entries)
    })
}

/// Parse a `lastmod` value in any of the W3C datetime forms sitemaps use.
fn parse_lastmod(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    debug!(value = %s, "unparseable lastmod");
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parses_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url>
            <loc>  https://o.github.io/s/  </loc>
            <lastmod>2024-01-15T10:30:00Z</lastmod>
            <priority>0.8</priority>
          </url>
          <url><loc>https://o.github.io/s/a.html</loc></url>
          <url><lastmod>2024-01-15</lastmod></url>
        </urlset>"#;

        let sitemap = parse_sitemap(xml).unwrap();
        assert_eq!(sitemap.entries.len(), 2);
        assert_eq!(sitemap.entries[0].url, "https://o.github.io/s/");
        assert_eq!(
            sitemap.entries[0].lastmod.unwrap().format("%Y-%m-%dT%H:%M").to_string(),
            "2024-01-15T10:30"
        );
        assert!(sitemap.entries[1].lastmod.is_none());
    }

    #[test]
    fn test_parses_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <sitemap><loc>https://o.github.io/s/sitemap-1.xml</loc></sitemap>
          <sitemap><loc>https://o.github.io/s/sitemap-2.xml</loc><lastmod>2024-01-01</lastmod></sitemap>
        </sitemapindex>"#;

        let sitemap = parse_sitemap(xml).unwrap();
        assert!(sitemap.entries.is_empty());
        assert_eq!(sitemap.children.len(), 2);
    }

    #[test]
    fn test_escaped_locations() {
        let xml = "<urlset><url><loc>https://o.github.io/s/?a=1&amp;b=2</loc></url></urlset>";
        let sitemap = parse_sitemap(xml).unwrap();
        assert_eq!(sitemap.entries[0].url, "https://o.github.io/s/?a=1&b=2");
    }

    #[test]
    fn test_rejects_non_sitemap() {
        assert!(parse_sitemap("<html><body>404</body></html>").is_err());
        assert!(parse_sitemap("<urlset><url><loc>x</loc></urlset>").is_err());
    }

    #[test]
    fn test_lastmod_formats() {
        for value in [
            "2024-01-15",
            "2024-01-15T10:30:00Z",
            "2024-01-15T10:30:00+02:00",
            "2024-01-15T10:30:00.123Z",
            "2024-01-15T10:30:00",
        ] {
            assert!(parse_lastmod(value).is_some(), "failed on {value}");
        }
        assert!(parse_lastmod("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_fetch_follows_index() {
        // Given: an index pointing at two child sitemaps, one of them missing
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<sitemapindex>
                  <sitemap><loc>{base}/a.xml</loc></sitemap>
                  <sitemap><loc>{base}/missing.xml</loc></sitemap>
                </sitemapindex>"#
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<urlset><url><loc>{base}/one.html</loc></url><url><loc>{base}/two.html</loc></url></urlset>"
            )))
            .mount(&server)
            .await;

        // When: the index is fetched
        let fetcher = Fetcher::new().unwrap();
        let url = Url::parse(&format!("{base}/sitemap.xml")).unwrap();
        let entries = fetch_sitemap(&fetcher, &url).await.unwrap();

        // Then: entries from the reachable child are returned
        let urls: Vec<_> = entries.iter().map(|e| e.url.clone()).collect();
        assert_eq!(urls, vec![format!("{base}/one.html"), format!("{base}/two.html")]);
    }

    #[tokio::test]
    async fn test_fetch_self_referencing_index_terminates() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/sitemap.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<sitemapindex><sitemap><loc>{base}/sitemap.xml</loc></sitemap></sitemapindex>"
            )))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new().unwrap();
        let url = Url::parse(&format!("{base}/sitemap.xml")).unwrap();
        let entries = fetch_sitemap(&fetcher, &url).await.unwrap();
        assert!(entries.is_empty());
        // Root plus two levels of nesting
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }
}
