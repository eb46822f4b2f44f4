//! Configuration management for pagesync.
//!
//! Configuration is stored in TOML and layered in this order:
//!
//! 1. **Config file**: an explicit path, `$PAGESYNC_CONFIG`,
//!    `$PAGESYNC_CONFIG_DIR/config.toml`, or the platform config directory
//! 2. **Environment variables**: `NOTION_TOKEN`, `NOTION_PARENT_PAGE_ID`,
//!    `NOTION_API_BASE` and `PAGESYNC_MAX_PAGES` override the file
//!
//! A missing file yields the defaults. A malformed file is an error.
//!
//! ## Example Configuration File
//!
//! ```toml
//! [notion]
//! parent_page_id = "0f4c3f0e9a3b4c1d8e2f7a6b5c4d3e2f"
//!
//! [discovery]
//! mode = "crawl"
//! max_pages = 50
//!
//! [sync]
//! requests_per_second = 3.0
//! max_retries = 4
//!
//! [[classifier.notebook_signatures]]
//! kind = "class"
//! marker = "jp-Notebook"
//! ```
//!
//! ```rust
//! use pagesync_core::Config;
//!
//! let config: Config = toml::from_str("[discovery]\nmax_pages = 25\n")?;
//! assert_eq!(config.discovery.max_pages, 25);
//! assert_eq!(config.sync.batch_size, 100);
//! # Ok::<(), toml::de::Error>(())
//! ```

use crate::classify::NotebookSignature;
use crate::discovery::DiscoveryMode;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum number of blocks the Notion API accepts per append request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Default Notion API version header.
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Default Notion API base URL.
pub const DEFAULT_NOTION_API_BASE: &str = "https://api.notion.com";

/// Top-level configuration for a pagesync run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote store credentials and endpoint.
    pub notion: NotionConfig,
    /// Page fetching settings.
    pub fetch: FetchConfig,
    /// Page discovery settings.
    pub discovery: DiscoveryConfig,
    /// Remote write pacing and batching.
    pub sync: SyncConfig,
    /// Content classification settings.
    pub classifier: ClassifierConfig,
}

/// Notion API settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotionConfig {
    /// Integration bearer token.
    pub token: Option<String>,
    /// Page under which the per-site database is created.
    pub parent_page_id: Option<String>,
    /// Page title searched for when no parent page id is configured.
    pub fallback_parent_title: String,
    /// API base URL, overridable for testing against a mock server.
    pub api_base: String,
    /// Value of the `Notion-Version` header.
    pub notion_version: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("parent_page_id", &self.parent_page_id)
            .field("fallback_parent_title", &self.fallback_parent_title)
            .field("api_base", &self.api_base)
            .field("notion_version", &self.notion_version)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token: None,
            parent_page_id: None,
            fallback_parent_title: "GitHub Pages Sync".to_string(),
            api_base: DEFAULT_NOTION_API_BASE.to_string(),
            notion_version: DEFAULT_NOTION_VERSION.to_string(),
            timeout_secs: 30,
        }
    }
}

/// HTTP settings for fetching site pages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent with page requests.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("pagesync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// How page URLs are discovered for a site.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Discovery strategy.
    pub mode: DiscoveryMode,
    /// Upper bound on pages per run.
    pub max_pages: usize,
    /// File extensions that are never fetched as pages.
    pub skip_extensions: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Auto,
            max_pages: 100,
            skip_extensions: [
                "pdf", "zip", "tar", "gz", "tgz", "jpg", "jpeg", "png", "gif", "svg", "webp",
                "ico", "css", "js", "json", "xml", "txt", "mp4", "mp3", "woff", "woff2", "ttf",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Remote write pacing and batching.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on remote requests started per second.
    pub requests_per_second: f64,
    /// Retries for rate-limited or transient remote failures.
    pub max_retries: u32,
    /// Initial backoff when the server gives no `Retry-After`.
    pub base_backoff_ms: u64,
    /// Blocks per append request; clamped to [`MAX_BATCH_SIZE`].
    pub batch_size: usize,
}

impl SyncConfig {
    /// Batch size clamped to the range the Notion API accepts.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_SIZE)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 3.0,
            max_retries: 4,
            base_backoff_ms: 500,
            batch_size: MAX_BATCH_SIZE,
        }
    }
}

/// Content classification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Notebook signatures, evaluated in order; first match wins.
    pub notebook_signatures: Vec<NotebookSignature>,
    /// Minimum anchors before a page can count as link-dominated.
    pub index_min_links: usize,
    /// Share of body text inside anchors that marks a page as an index.
    pub index_link_ratio: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            notebook_signatures: NotebookSignature::defaults(),
            index_min_links: 5,
            index_link_ratio: 0.6,
        }
    }
}

impl Config {
    /// Load configuration from the resolved config path, then apply
    /// environment overrides.
    ///
    /// `explicit` wins over every other location.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::config_path(),
        };

        let mut config = match path {
            Some(path) if path.exists() => Self::load_from_path(&path)?,
            Some(path) if explicit.is_some() => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            },
            _ => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file without consulting the environment.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("NOTION_TOKEN") {
            self.notion.token = Some(token);
        }
        if let Some(parent) = non_empty("NOTION_PARENT_PAGE_ID") {
            self.notion.parent_page_id = Some(parent);
        }
        if let Some(base) = non_empty("NOTION_API_BASE") {
            self.notion.api_base = base;
        }
        if let Some(max) = non_empty("PAGESYNC_MAX_PAGES") {
            match max.trim().parse() {
                Ok(value) => self.discovery.max_pages = value,
                Err(_) => tracing::warn!(value = %max, "ignoring invalid PAGESYNC_MAX_PAGES"),
            }
        }
    }

    /// Check values that would otherwise fail deep inside a run.
    pub fn validate(&self) -> Result<()> {
        let rps = self.sync.requests_per_second;
        if rps.is_nan() || rps <= 0.0 {
            return Err(Error::Config(
                "sync.requests_per_second must be greater than zero".into(),
            ));
        }
        if self.discovery.max_pages == 0 {
            return Err(Error::Config("discovery.max_pages must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.classifier.index_link_ratio) {
            return Err(Error::Config(
                "classifier.index_link_ratio must be between 0 and 1".into(),
            ));
        }
        url::Url::parse(&self.notion.api_base)
            .map_err(|e| Error::Config(format!("Invalid notion.api_base: {e}")))?;
        Ok(())
    }

    /// Resolve the config file location from the environment and platform.
    ///
    /// - `$PAGESYNC_CONFIG`
    /// - `$PAGESYNC_CONFIG_DIR/config.toml`
    /// - Linux: `~/.config/pagesync/config.toml`
    /// - macOS: `~/Library/Application Support/dev.pagesync.pagesync/config.toml`
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os("PAGESYNC_CONFIG") {
            return Some(PathBuf::from(path));
        }
        if let Some(dir) = std::env::var_os("PAGESYNC_CONFIG_DIR") {
            return Some(PathBuf::from(dir).join("config.toml"));
        }
        directories::ProjectDirs::from("dev", "pagesync", "pagesync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::classify::SignatureKind;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_values() {
        // Given: Default configuration
        let config = Config::default();

        // Then: Defaults match the documented values
        assert_eq!(config.discovery.max_pages, 100);
        assert!(matches!(config.discovery.mode, DiscoveryMode::Auto));
        assert!((config.sync.requests_per_second - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.sync.batch_size, 100);
        assert_eq!(config.notion.notion_version, "2022-06-28");
        assert_eq!(config.notion.fallback_parent_title, "GitHub Pages Sync");
        assert!(config.notion.token.is_none());
        assert!(!config.classifier.notebook_signatures.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        // Given: A config file that sets a single section
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[sync]
requests_per_second = 1.5

[[classifier.notebook_signatures]]
kind = "script"
marker = "pyodide"
"#,
        )
        .unwrap();

        // When: Loading it
        let config = Config::load(Some(&path)).unwrap();

        // Then: Unset fields keep their defaults and lists are replaced
        assert!((config.sync.requests_per_second - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.sync.max_retries, 4);
        assert_eq!(config.classifier.notebook_signatures.len(), 1);
        assert_eq!(
            config.classifier.notebook_signatures[0].kind,
            SignatureKind::Script
        );
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();

        match Config::load(Some(&path)) {
            Err(Error::Config(msg)) => assert!(msg.contains("Failed to parse config")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let result = Config::load(Some(Path::new("/definitely/not/here/config.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides_file_values() {
        // Given: File values and an environment that overrides some of them
        let mut config = Config::default();
        config.notion.token = Some("from-file".into());
        let env: HashMap<&str, &str> = [
            ("NOTION_TOKEN", "secret_env"),
            ("NOTION_PARENT_PAGE_ID", "abc123"),
            ("PAGESYNC_MAX_PAGES", "7"),
            ("NOTION_API_BASE", ""),
        ]
        .into_iter()
        .collect();

        // When: Applying the environment
        config.apply_env(|key| env.get(key).map(|v| (*v).to_string()));

        // Then: Non-empty values win, empty values are ignored
        assert_eq!(config.notion.token.as_deref(), Some("secret_env"));
        assert_eq!(config.notion.parent_page_id.as_deref(), Some("abc123"));
        assert_eq!(config.discovery.max_pages, 7);
        assert_eq!(config.notion.api_base, DEFAULT_NOTION_API_BASE);
    }

    #[test]
    fn test_token_is_redacted_in_debug() {
        let mut config = Config::default();
        config.notion.token = Some("secret_abcdef".into());

        let debug = format!("{config:?}");
        assert!(!debug.contains("secret_abcdef"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_batch_size_is_clamped() {
        let mut sync = SyncConfig {
            batch_size: 500,
            ..SyncConfig::default()
        };
        assert_eq!(sync.effective_batch_size(), MAX_BATCH_SIZE);

        sync.batch_size = 0;
        assert_eq!(sync.effective_batch_size(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.sync.requests_per_second = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.index_link_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.notion.api_base = "not a url".into();
        assert!(config.validate().is_err());
    }
}
