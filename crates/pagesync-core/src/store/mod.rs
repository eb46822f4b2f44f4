//! Remote store abstraction.
//!
//! The orchestrator writes through [`RemoteStore`] and never sees HTTP
//! details. [`crate::notion::NotionClient`] implements it against the Notion
//! REST API; [`MemoryStore`] keeps everything in process for dry runs and
//! tests.

mod memory;

pub use memory::{AppendCall, MemoryStore, StoredPage};

use crate::Result;
use crate::blocks::Block;
use crate::classify::ContentType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a database or page in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Properties written to every page entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageProperties {
    /// `Name` title property.
    pub title: String,
    /// `URL` property; the lookup key.
    pub url: String,
    /// `Last Updated` date property.
    pub last_synced: DateTime<Utc>,
    /// `Content Type` select property.
    pub content_type: ContentType,
}

/// Where pages and their content are persisted.
///
/// `parent` is `None` for pages that live directly in the site database and
/// the parent page id for nested pages.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Find or create the database for a site, returning its id.
    async fn ensure_database(&self, title: &str) -> Result<RemoteId>;

    /// Find the existing page for `props.url`.
    async fn find_page(
        &self,
        database: &RemoteId,
        parent: Option<&RemoteId>,
        props: &PageProperties,
    ) -> Result<Option<RemoteId>>;

    /// Create a page with the given properties and no content.
    async fn create_page(
        &self,
        database: &RemoteId,
        parent: Option<&RemoteId>,
        props: &PageProperties,
    ) -> Result<RemoteId>;

    /// Overwrite a page's properties.
    async fn update_page(
        &self,
        page: &RemoteId,
        parent: Option<&RemoteId>,
        props: &PageProperties,
    ) -> Result<()>;

    /// Remove a page's content blocks, keeping nested pages.
    async fn clear_content(&self, page: &RemoteId) -> Result<()>;

    /// Append one batch of blocks to the end of a page.
    async fn append_blocks(&self, page: &RemoteId, blocks: &[Block]) -> Result<()>;
}
