//! Parsed HTML documents.
//!
//! Wraps a [`scraper::Html`] tree together with the page URL and the base URL
//! used to resolve relative references.

use crate::{Error, Result};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// Runs of any whitespace.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Parse a static CSS selector.
///
/// Only used with literal selectors, which are known to be valid.
#[allow(clippy::unwrap_used)]
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

/// An HTML page parsed into a navigable tree.
pub struct Document {
    url: Url,
    base_url: Url,
    html: Html,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.url.as_str())
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Parse raw HTML fetched from `url`.
    ///
    /// html5ever recovers from nearly any markup, so only bodies that cannot
    /// be a document at all are rejected: empty input and binary content.
    pub fn parse(url: &Url, body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Err(Error::Parse(format!("empty document at {url}")));
        }
        if body.contains('\0') {
            return Err(Error::Parse(format!("binary content at {url}")));
        }

        let html = Html::parse_document(body);
        if !html.errors.is_empty() {
            debug!(url = %url, recovered = html.errors.len(), "html parser recovered from errors");
        }

        let base_url = html
            .select(&selector("base[href]"))
            .next()
            .and_then(|base| base.value().attr("href"))
            .and_then(|href| url.join(href).ok())
            .unwrap_or_else(|| url.clone());

        Ok(Self {
            url: url.clone(),
            base_url,
            html,
        })
    }

    /// URL the document was fetched from.
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// URL used to resolve relative links and image sources.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Underlying parsed tree.
    pub const fn html(&self) -> &Html {
        &self.html
    }

    /// Page title: `<title>`, then the first `<h1>`, then a title derived
    /// from the URL.
    pub fn title(&self) -> String {
        ["title", "h1"]
            .into_iter()
            .find_map(|css| {
                self.html
                    .select(&selector(css))
                    .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                    .find(|text| !text.is_empty())
            })
            .unwrap_or_else(|| title_from_url(&self.url))
    }
}

/// Derive a readable title from the last path segment of a URL.
///
/// `/guides/getting_started.html` becomes "Getting Started"; the root is
/// "Home".
pub fn title_from_url(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .unwrap_or_default();

    let stem = [".html", ".htm", ".ipynb"]
        .iter()
        .find_map(|ext| last.strip_suffix(ext))
        .unwrap_or(last);

    let decoded = percent_decode(stem);
    let words: Vec<String> = decoded
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect();

    if words.is_empty() || stem == "index" {
        "Home".to_string()
    } else {
        words.join(" ")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn percent_decode(segment: &str) -> String {
    let query = format!("s={}", segment.replace('+', "%2B").replace('&', "%26"));
    url::form_urlencoded::parse(query.as_bytes())
        .next()
        .map_or_else(|| segment.to_string(), |(_, value)| value.into_owned())
}
