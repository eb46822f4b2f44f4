use crate::config::FetchConfig;
use crate::{Error, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, redirect};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// A successfully fetched HTML page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested.
    pub requested_url: Url,
    /// URL after following redirects.
    pub final_url: Url,
    /// `Content-Type` header, when the server sent one.
    pub content_type: Option<String>,
    /// Response body.
    pub body: String,
}

/// HTTP client for fetching site pages and sitemaps
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Creates a new fetcher with default settings
    pub fn new() -> Result<Self> {
        Self::from_config(&FetchConfig::default())
    }

    /// Creates a fetcher from the `[fetch]` config section
    pub fn from_config(config: &FetchConfig) -> Result<Self> {
        Self::build(Duration::from_secs(config.timeout_secs), &config.user_agent)
    }

    /// Creates a new fetcher with a custom request timeout (primarily for tests)
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::build(timeout, concat!("pagesync/", env!("CARGO_PKG_VERSION")))
    }

    fn build(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }

    /// Fetches an HTML page, following redirects.
    ///
    /// Responses whose content type is present but not HTML are rejected with
    /// [`Error::UnsupportedContent`].
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_page(&self, url: &Url) -> Result<FetchedPage> {
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("fetching {url}"))
            } else {
                Error::Network(e)
            }
        })?;
        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(status_error(url, status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(ct) = content_type.as_deref() {
            if !is_html_content_type(ct) {
                return Err(Error::UnsupportedContent {
                    url: url.to_string(),
                    content_type: ct.to_string(),
                });
            }
        }

        let body = response.text().await?;
        debug!(
            bytes = body.len(),
            final_url = %final_url,
            redirected = final_url != *url,
            "fetched page"
        );

        Ok(FetchedPage {
            requested_url: url.clone(),
            final_url,
            content_type,
            body,
        })
    }

    /// Fetches any text resource (used for sitemaps), without a content type check
    pub async fn fetch_text(&self, url: &Url) -> Result<String> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(url, status));
        }
        Ok(response.text().await?)
    }
}

fn status_error(url: &Url, status: StatusCode) -> Error {
    if status == StatusCode::NOT_FOUND {
        Error::NotFound(format!("No page at '{url}'"))
    } else {
        Error::Fetch {
            url: url.to_string(),
            status: status.as_u16(),
        }
    }
}

/// Whether a `Content-Type` value denotes an HTML document
pub fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

// Note: Default is not implemented as Fetcher::new() can fail.

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header_exists, method, path},
    };

    fn page_url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{p}", server.uri())).unwrap()
    }

    #[test]
    fn test_html_content_type_detection() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("Application/XHTML+XML"));
        assert!(!is_html_content_type("application/pdf"));
        assert!(!is_html_content_type("text/plain"));
    }

    #[tokio::test]
    async fn test_fetch_page_returns_body() -> anyhow::Result<()> {
        // Given: A server that serves an HTML page
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/guide/"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><body><p>hi</p></body></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        // When: Fetching the page
        let fetcher = Fetcher::new()?;
        let page = fetcher.fetch_page(&page_url(&server, "/guide/")).await?;

        // Then: The body and metadata are returned
        assert!(page.body.contains("<p>hi</p>"));
        assert_eq!(page.final_url, page.requested_url);
        assert_eq!(
            page.content_type.as_deref(),
            Some("text/html; charset=utf-8")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_page_follows_redirects() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", format!("{}/docs/", server.uri())),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<h1>Docs</h1>", "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new()?;
        let page = fetcher.fetch_page(&page_url(&server, "/docs")).await?;

        assert_eq!(page.final_url.path(), "/docs/");
        assert_eq!(page.requested_url.path(), "/docs");
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_404_is_not_found() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.html"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new()?;
        match fetcher.fetch_page(&page_url(&server, "/missing.html")).await {
            Err(Error::NotFound(msg)) => assert!(msg.contains("missing.html")),
            other => panic!("Expected NotFound, got: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_500_is_fetch_error() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken.html"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new()?;
        match fetcher.fetch_page(&page_url(&server, "/broken.html")).await {
            Err(Error::Fetch { status, .. }) => assert_eq!(status, 500),
            other => panic!("Expected Fetch error, got: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_html() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paper"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(b"%PDF-1.4".to_vec(), "application/pdf"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new()?;
        let result = fetcher.fetch_page(&page_url(&server, "/paper")).await;
        assert!(matches!(result, Err(Error::UnsupportedContent { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_timeout() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow.html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("slow")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::with_timeout(Duration::from_millis(100))?;
        let result = fetcher.fetch_page(&page_url(&server, "/slow.html")).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        Ok(())
    }
}
