//! Page hierarchy derived from URL paths.
//!
//! Every page sits at a [`PagePath`]: its URL path segments relative to the
//! site root. Depth is the segment count and the parent is the path with the
//! last segment removed, so `/site/guide/setup` under root `/site/` has depth
//! 2 and parent `guide`. The site root itself has depth 0 and no parent.
//!
//! ```rust
//! use pagesync_core::hierarchy::PagePath;
//! use url::Url;
//!
//! let root = Url::parse("https://octo.github.io/site/")?;
//! let page = Url::parse("https://octo.github.io/site/guide/setup.html")?;
//! let path = PagePath::resolve(&root, &page)?;
//! assert_eq!(path.depth(), 2);
//! assert_eq!(path.parent().map(|p| p.key()), Some("guide".to_string()));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::store::RemoteId;
use crate::{Error, Result};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Position of a page in the site tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PagePath {
    segments: Vec<String>,
}

impl PagePath {
    /// The site root.
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Build a path from segments, ignoring empty ones.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Compute the path of `page` relative to `root`.
    ///
    /// Fails when the page is on another origin or outside the root path.
    pub fn resolve(root: &Url, page: &Url) -> Result<Self> {
        if root.origin() != page.origin() {
            return Err(Error::InvalidUrl(format!(
                "{page} is not on the same origin as {root}"
            )));
        }

        let root_segments: Vec<&str> = non_empty_segments(root).collect();
        let page_segments: Vec<&str> = non_empty_segments(page).collect();

        if !page_segments.starts_with(&root_segments) {
            return Err(Error::InvalidUrl(format!("{page} is outside site root {root}")));
        }

        Ok(Self::from_segments(
            page_segments[root_segments.len()..].iter().copied(),
        ))
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Path with the last segment removed; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// Every ancestor from the root down to the parent.
    pub fn ancestors(&self) -> Vec<Self> {
        (0..self.segments.len())
            .map(|n| Self {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    /// Whether this is the site root.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Map key: segments joined with `/`; empty for the root.
    pub fn key(&self) -> String {
        self.segments.join("/")
    }

    /// URL of this path under `root`, as a directory (trailing slash) unless
    /// the last segment looks like a file.
    pub fn to_url(&self, root: &Url) -> Result<Url> {
        let mut relative = self.key();
        let looks_like_file = self
            .segments
            .last()
            .is_some_and(|last| last.contains('.'));
        if !relative.is_empty() && !looks_like_file {
            relative.push('/');
        }
        Ok(root.join(&relative)?)
    }
}

impl fmt::Display for PagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.key())
    }
}

impl Serialize for PagePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn non_empty_segments(url: &Url) -> impl Iterator<Item = &str> {
    url.path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
}

/// Remote page ids of pages synced so far in a run, keyed by path.
#[derive(Debug, Default)]
pub struct HierarchyMap {
    pages: HashMap<String, RemoteId>,
}

impl HierarchyMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the remote id for a path, replacing any earlier entry.
    pub fn insert(&mut self, path: &PagePath, id: RemoteId) {
        self.pages.insert(path.key(), id);
    }

    /// Remote id for a path, if it has been synced.
    pub fn get(&self, path: &PagePath) -> Option<&RemoteId> {
        self.pages.get(&path.key())
    }

    /// Whether a path has been synced.
    pub fn contains(&self, path: &PagePath) -> bool {
        self.pages.contains_key(&path.key())
    }

    /// Key of the path that already holds `id`, if any.
    pub fn claimed_by(&self, id: &RemoteId) -> Option<&str> {
        self.pages
            .iter()
            .find(|(_, claimed)| *claimed == id)
            .map(|(key, _)| key.as_str())
    }

    /// Number of synced paths.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether nothing has been synced yet.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
