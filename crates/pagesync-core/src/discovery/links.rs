use crate::document::{Document, selector};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

/// `window.location = "..."`, `window.location.href = "..."` and
/// `window.location.replace("...")`.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static LOCATION_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.location(?:\.href|\.replace)?\s*[=(]\s*["']([^"'\\\n]+)["']"#).unwrap()
});

/// Quoted `.html` paths inside a `var redirects = {...}` table.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static REDIRECT_TABLE_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["']([^"'\\\n]+\.html?)["']"#).unwrap());

/// `0; URL=target` in a meta refresh.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static META_REFRESH_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)url\s*=\s*['\x22]?([^'\x22]+)").unwrap());

const SKIPPED_SCHEMES: &[&str] = &["mailto:", "javascript:", "tel:", "data:"];

/// Absolute URLs a page points at: anchors, JavaScript redirects and meta
/// refresh targets, in document order and without duplicates.
///
/// Only `http` and `https` targets are returned. Fragments are dropped.
pub fn extract_links(doc: &Document) -> Vec<Url> {
    let base = doc.base_url();
    let html = doc.html();
    let mut found: Vec<Url> = Vec::new();

    let mut push = |raw: &str, relative_to: &Url| {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            return;
        }
        let lower = raw.to_ascii_lowercase();
        if SKIPPED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
            return;
        }
        if let Ok(mut url) = relative_to.join(raw) {
            if !matches!(url.scheme(), "http" | "https") {
                return;
            }
            url.set_fragment(None);
            if !found.contains(&url) {
                found.push(url);
            }
        }
    };

    for anchor in html.select(&selector("a[href]")) {
        if let Some(href) = anchor.value().attr("href") {
            push(href, base);
        }
    }

    // Script redirects resolve against the page itself, as a browser would
    for script in html.select(&selector("script:not([src])")) {
        let source: String = script.text().collect();
        if source.contains("window.location") {
            for cap in LOCATION_ASSIGNMENT.captures_iter(&source) {
                if &cap[1] != "/" {
                    push(&cap[1], doc.url());
                }
            }
        }
        if source.contains("var redirects") {
            for cap in REDIRECT_TABLE_ENTRY.captures_iter(&source) {
                push(&cap[1], doc.url());
            }
        }
    }

    for meta in html.select(&selector("meta[http-equiv]")) {
        let is_refresh = meta
            .value()
            .attr("http-equiv")
            .is_some_and(|v| v.eq_ignore_ascii_case("refresh"));
        if !is_refresh {
            continue;
        }
        if let Some(cap) = meta
            .value()
            .attr("content")
            .and_then(|content| META_REFRESH_TARGET.captures(content))
        {
            push(&cap[1], doc.url());
        }
    }

    found
}
