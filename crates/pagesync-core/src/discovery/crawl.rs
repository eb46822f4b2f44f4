use super::links::extract_links;
use super::{DiscoveryFailure, canonicalize, has_skipped_extension};
use crate::document::Document;
use crate::fetcher::{FetchedPage, Fetcher};
use crate::hierarchy::PagePath;
use crate::{Error, Result};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, warn};
use url::Url;

/// Pages and failures collected by a crawl.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    /// Fetched pages in breadth-first order, keyed by their final URL.
    pub pages: Vec<(Url, FetchedPage)>,
    /// URLs that could not be fetched or parsed.
    pub failures: Vec<DiscoveryFailure>,
}

/// Breadth-first crawler confined to one site root.
pub struct Crawler {
    fetcher: Fetcher,
    root: Url,
    max_pages: usize,
    skip_extensions: Vec<String>,
}

impl Crawler {
    /// Crawler for pages under `root`.
    pub fn new(fetcher: Fetcher, root: Url, max_pages: usize, skip_extensions: Vec<String>) -> Self {
        Self {
            fetcher,
            root,
            max_pages,
            skip_extensions,
        }
    }

    fn key_under_root(&self, url: &Url) -> Option<String> {
        PagePath::resolve(&self.root, url).ok().map(|p| p.key())
    }

    /// Crawl from the root. `seed` is the already-fetched root response.
    pub async fn crawl(&self, mut seed: Option<FetchedPage>) -> CrawlOutcome {
        let mut outcome = CrawlOutcome::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<Url> = VecDeque::from([self.root.clone()]);

        while let Some(url) = queue.pop_front() {
            if outcome.pages.len() >= self.max_pages {
                info!(max_pages = self.max_pages, "page limit reached, stopping crawl");
                break;
            }

            let url = canonicalize(&url);
            let Some(key) = self.key_under_root(&url) else {
                continue;
            };
            if !visited.insert(key.clone()) {
                continue;
            }
            if has_skipped_extension(&url, &self.skip_extensions) {
                debug!(url = %url, "skipping non-page url");
                continue;
            }

            let prefetched = if url == self.root { seed.take() } else { None };
            let fetched = match prefetched {
                Some(page) => Ok(page),
                None => self.fetcher.fetch_page(&url).await,
            };
            let page = match fetched {
                Ok(page) => page,
                Err(Error::UnsupportedContent { content_type, .. }) => {
                    debug!(url = %url, content_type, "skipping non-html response");
                    continue;
                },
                Err(error) => {
                    warn!(url = %url, stage = "fetch", error = %error, "crawl fetch failed");
                    outcome.failures.push(DiscoveryFailure {
                        url: url.to_string(),
                        error,
                    });
                    continue;
                },
            };

            let final_url = canonicalize(&page.final_url);
            if final_url != url {
                match self.key_under_root(&final_url) {
                    None => {
                        debug!(from = %url, to = %final_url, "redirect leaves site root");
                        continue;
                    },
                    Some(final_key) if final_key != key && !visited.insert(final_key.clone()) => continue,
                    Some(_) => {},
                }
            }

            match links_of(&final_url, &page.body) {
                Ok(links) => {
                    for link in links {
                        let link = canonicalize(&link);
                        if self
                            .key_under_root(&link)
                            .is_some_and(|k| !visited.contains(&k))
                        {
                            queue.push_back(link);
                        }
                    }
                },
                Err(error) => {
                    warn!(url = %final_url, stage = "parse", error = %error, "crawl parse failed");
                    outcome.failures.push(DiscoveryFailure {
                        url: final_url.to_string(),
                        error,
                    });
                    continue;
                },
            }

            outcome.pages.push((final_url, page));
        }

        info!(
            pages = outcome.pages.len(),
            failures = outcome.failures.len(),
            "crawl finished"
        );
        outcome
    }
}

/// Parse and extract links without holding the tree across an await.
fn links_of(url: &Url, body: &str) -> Result<Vec<Url>> {
    let doc = Document::parse(url, body)?;
    Ok(extract_links(&doc))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(
            format!("<html><body>{body}</body></html>"),
            "text/html",
        )
    }

    async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn crawler(server: &MockServer, max_pages: usize) -> Crawler {
        let root = Url::parse(&format!("{}/site/", server.uri())).unwrap();
        Crawler::new(
            Fetcher::new().unwrap(),
            root,
            max_pages,
            vec!["pdf".into(), "png".into()],
        )
    }

    fn keys(outcome: &CrawlOutcome, server: &MockServer) -> Vec<String> {
        let prefix = format!("{}/site/", server.uri());
        outcome
            .pages
            .iter()
            .map(|(url, _)| url.as_str().trim_start_matches(&prefix).to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_breadth_first_within_root() {
        // Given: a small site with links outside the root and to files
        let server = MockServer::start().await;
        serve(
            &server,
            "/site/",
            html(
                r#"<a href="guide/">Guide</a>
                   <a href="about.html#team">About</a>
                   <a href="/elsewhere/">Out</a>
                   <a href="https://example.com/">Ext</a>
                   <a href="manual.pdf">PDF</a>"#,
            ),
        )
        .await;
        serve(&server, "/site/guide/", html(r#"<a href="setup.html">Setup</a><a href="../">Up</a>"#)).await;
        serve(&server, "/site/about.html", html("about")).await;
        serve(&server, "/site/guide/setup.html", html("setup")).await;

        // When: crawling
        let outcome = crawler(&server, 100).crawl(None).await;

        // Then: pages are visited breadth-first, each once, inside the root
        assert_eq!(keys(&outcome, &server), vec!["", "guide/", "about.html", "guide/setup.html"]);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failures_are_recorded() {
        let server = MockServer::start().await;
        serve(&server, "/site/", html(r#"<a href="gone.html">x</a><a href="ok.html">y</a>"#)).await;
        serve(&server, "/site/ok.html", html("ok")).await;

        let outcome = crawler(&server, 100).crawl(None).await;

        assert_eq!(keys(&outcome, &server), vec!["", "ok.html"]);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].url.ends_with("/site/gone.html"));
        assert!(matches!(outcome.failures[0].error, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_page_cap() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/site/",
            html(r#"<a href="a.html">a</a><a href="b.html">b</a><a href="c.html">c</a>"#),
        )
        .await;
        for page in ["a", "b", "c"] {
            serve(&server, &format!("/site/{page}.html"), html(page)).await;
        }

        let outcome = crawler(&server, 2).crawl(None).await;
        assert_eq!(outcome.pages.len(), 2);
    }

    #[tokio::test]
    async fn test_follows_script_redirect_and_skips_binary() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/site/",
            html(r#"<script>window.location.replace("docs/index.html")</script><a href="data.bin">d</a>"#),
        )
        .await;
        serve(&server, "/site/docs/", html("docs")).await;
        serve(
            &server,
            "/site/data.bin",
            ResponseTemplate::new(200).set_body_raw(vec![0u8, 1, 2], "application/octet-stream"),
        )
        .await;

        let outcome = crawler(&server, 100).crawl(None).await;
        assert_eq!(keys(&outcome, &server), vec!["", "docs/"]);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_seed_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site/"))
            .respond_with(html("root"))
            .expect(1)
            .mount(&server)
            .await;

        let crawler = crawler(&server, 100);
        let seed = Fetcher::new().unwrap().fetch_page(&crawler.root).await.unwrap();
        let outcome = crawler.crawl(Some(seed)).await;
        assert_eq!(outcome.pages.len(), 1);
    }
}
