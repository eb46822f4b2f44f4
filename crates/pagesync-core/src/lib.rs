//! # pagesync-core
//!
//! Core functionality for pagesync - mirrors a GitHub Pages site into a
//! Notion database.
//!
//! A run discovers the site's pages, fetches and parses each one, classifies
//! it (Notebook, HTML Page or Index), maps its HTML into Notion-style blocks
//! and writes it under its URL-path parent, one database per site.
//!
//! ## Architecture
//!
//! - **Fetching**: [`fetcher`] retrieves HTML over HTTP, following redirects
//! - **Parsing**: [`document`] wraps the parsed tree with its base URL
//! - **Classification**: [`classify`] assigns the content type
//! - **Mapping**: [`mapper`] turns elements into [`blocks`]
//! - **Hierarchy**: [`hierarchy`] derives depth and parent from URL paths
//! - **Discovery**: [`discovery`] finds pages via sitemap, crawl or list
//! - **Storage**: [`store`] defines the remote seam, [`notion`] implements it
//! - **Orchestration**: [`sync`] drives the whole run
//!
//! ## Quick Start
//!
//! ```rust
//! use pagesync_core::{BlockMapper, Classifier, ContentType, Document};
//! use url::Url;
//!
//! let url = Url::parse("https://octo.github.io/site/guide.html")?;
//! let doc = Document::parse(&url, "<main><h5>Setup</h5><p>Run it.</p></main>")?;
//!
//! assert_eq!(Classifier::default().classify(&doc).content_type, ContentType::HtmlPage);
//! let mapped = BlockMapper::new().map(&doc);
//! assert_eq!(mapped.blocks.len(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`]. Errors know whether they
//! should be retried ([`Error::is_recoverable`]) or end the run
//! ([`Error::is_fatal`]).

/// Block records and batching
pub mod blocks;
/// Content type classification
pub mod classify;
/// Configuration loading and defaults
pub mod config;
/// Page URL discovery
pub mod discovery;
/// Parsed HTML documents
pub mod document;
/// Error types and result aliases
pub mod error;
/// HTTP page fetching
pub mod fetcher;
/// URL path hierarchy
pub mod hierarchy;
/// HTML to block mapping
pub mod mapper;
/// Notion REST client
pub mod notion;
/// Remote store seam
pub mod store;
/// Sync orchestration
pub mod sync;

// Re-export commonly used types
pub use blocks::{Block, BlockKind, RichText, TextSpan};
pub use classify::{Classification, Classifier, ContentType};
pub use config::Config;
pub use discovery::{Discoverer, Discovery, DiscoveryMode, DiscoverySource};
pub use document::Document;
pub use error::{Error, Result};
pub use fetcher::{FetchedPage, Fetcher};
pub use hierarchy::{HierarchyMap, PagePath};
pub use mapper::{BlockMapper, MappedContent, MappingIssue};
pub use notion::NotionClient;
pub use store::{MemoryStore, RemoteId, RemoteStore};
pub use sync::{Orchestrator, PageFailure, PageRecord, PageSummary, Stage, SyncReport};
