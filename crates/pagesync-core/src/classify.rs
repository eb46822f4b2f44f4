//! Content classification for fetched pages.
//!
//! Every page is one of three kinds, written to the `Content Type` select
//! property of its database entry:
//!
//! - **Notebook**: rendered Jupyter notebooks, recognized by configurable
//!   signatures (class markers, notebook runtime scripts, URL fragments)
//! - **Index**: directory roots and link-dominated listing pages
//! - **HTML Page**: everything else
//!
//! Signatures are evaluated in configuration order and the first match wins.
//!
//! ```rust
//! use pagesync_core::classify::{Classifier, ContentType};
//! use pagesync_core::config::ClassifierConfig;
//! use pagesync_core::document::Document;
//! use url::Url;
//!
//! let url = Url::parse("https://octo.github.io/site/analysis.html")?;
//! let doc = Document::parse(&url, r#"<body><div class="jp-Notebook"><pre>1 + 1</pre></div></body>"#)?;
//! let classifier = Classifier::new(&ClassifierConfig::default());
//! assert_eq!(classifier.classify(&doc).content_type, ContentType::Notebook);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::config::ClassifierConfig;
use crate::document::{Document, collapse_whitespace, selector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of content a page holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    /// Rendered computational notebook.
    Notebook,
    /// Ordinary article or documentation page.
    #[serde(rename = "HTML Page")]
    HtmlPage,
    /// Directory root or listing of links.
    Index,
}

impl ContentType {
    /// Name of the select option in the remote database.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Notebook => "Notebook",
            Self::HtmlPage => "HTML Page",
            Self::Index => "Index",
        }
    }

    /// Color of the select option in the remote database.
    pub const fn color(self) -> &'static str {
        match self {
            Self::Notebook => "blue",
            Self::HtmlPage => "green",
            Self::Index => "purple",
        }
    }

    /// All variants, in select-option order.
    pub const ALL: [Self; 3] = [Self::Notebook, Self::HtmlPage, Self::Index];
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a notebook signature looks for its marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    /// Substring of any element class token.
    Class,
    /// Substring of a `<script>` `src` attribute or inline body.
    Script,
    /// Substring of the page URL.
    Url,
}

impl fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Class => "class",
            Self::Script => "script",
            Self::Url => "url",
        })
    }
}

/// A marker that identifies a rendered notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotebookSignature {
    /// Where to look.
    pub kind: SignatureKind,
    /// Case-insensitive substring to look for.
    pub marker: String,
}

impl NotebookSignature {
    /// Build a signature.
    pub fn new(kind: SignatureKind, marker: impl Into<String>) -> Self {
        Self {
            kind,
            marker: marker.into(),
        }
    }

    /// Signatures for nbconvert, JupyterLab, nbsphinx and MyST-NB output.
    pub fn defaults() -> Vec<Self> {
        let classes = [
            "jp-Notebook",
            "jupyter-notebook",
            "jp-Cell",
            "nbinput",
            "nboutput",
            "cell_output",
        ];
        let scripts = ["jupyter", "thebe", "require.js", "nbconvert", "voila"];

        classes
            .into_iter()
            .map(|m| Self::new(SignatureKind::Class, m))
            .chain(scripts.into_iter().map(|m| Self::new(SignatureKind::Script, m)))
            .chain(std::iter::once(Self::new(SignatureKind::Url, ".ipynb")))
            .collect()
    }

    fn matches(&self, doc: &Document) -> bool {
        let marker = self.marker.to_lowercase();
        if marker.is_empty() {
            return false;
        }
        match self.kind {
            SignatureKind::Url => doc.url().as_str().to_lowercase().contains(&marker),
            SignatureKind::Class => doc.html().select(&selector("[class]")).any(|el| {
                el.value()
                    .classes()
                    .any(|class| class.to_lowercase().contains(&marker))
            }),
            SignatureKind::Script => doc.html().select(&selector("script")).any(|script| {
                script
                    .value()
                    .attr("src")
                    .is_some_and(|src| src.to_lowercase().contains(&marker))
                    || script.text().any(|t| t.to_lowercase().contains(&marker))
            }),
        }
    }
}

/// Outcome of classifying one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    /// Assigned content type.
    pub content_type: ContentType,
    /// Which rule decided it.
    pub reason: String,
}

/// Assigns a [`ContentType`] to parsed documents.
#[derive(Debug, Clone)]
pub struct Classifier {
    signatures: Vec<NotebookSignature>,
    index_min_links: usize,
    index_link_ratio: f64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl Classifier {
    /// Build a classifier from the `[classifier]` config section.
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            signatures: config.notebook_signatures.clone(),
            index_min_links: config.index_min_links,
            index_link_ratio: config.index_link_ratio,
        }
    }

    /// Classify a document. Pure: the same document always yields the same
    /// classification.
    pub fn classify(&self, doc: &Document) -> Classification {
        if let Some(sig) = self.signatures.iter().find(|sig| sig.matches(doc)) {
            return Classification {
                content_type: ContentType::Notebook,
                reason: format!("{} marker '{}'", sig.kind, sig.marker),
            };
        }

        if doc.url().path().ends_with('/') {
            return Classification {
                content_type: ContentType::Index,
                reason: "directory root".to_string(),
            };
        }

        if let Some(ratio) = self.link_ratio(doc) {
            return Classification {
                content_type: ContentType::Index,
                reason: format!("link-dominated ({:.0}% link text)", ratio * 100.0),
            };
        }

        Classification {
            content_type: ContentType::HtmlPage,
            reason: "default".to_string(),
        }
    }

    /// Share of body text inside anchors, when the page qualifies as a
    /// listing.
    #[allow(clippy::cast_precision_loss)]
    fn link_ratio(&self, doc: &Document) -> Option<f64> {
        let html = doc.html();
        let anchors: Vec<String> = html
            .select(&selector("body a[href]"))
            .map(|a| collapse_whitespace(&a.text().collect::<String>()))
            .collect();
        if anchors.len() < self.index_min_links.max(1) {
            return None;
        }

        let body_len: usize = html
            .select(&selector("body"))
            .map(|body| {
                collapse_whitespace(&body.text().collect::<String>())
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .count()
            })
            .sum();
        if body_len == 0 {
            return None;
        }

        let link_len: usize = anchors
            .iter()
            .map(|t| t.chars().filter(|c| !c.is_whitespace()).count())
            .sum();
        let ratio = link_len as f64 / body_len as f64;
        (ratio >= self.index_link_ratio).then_some(ratio)
    }
}
