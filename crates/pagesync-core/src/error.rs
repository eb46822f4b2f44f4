//! Error types and handling for pagesync-core operations.
//!
//! A single error type covers every stage of a sync run: fetching pages,
//! parsing HTML, mapping content, and writing to the remote store. Errors are
//! categorized so the orchestrator can decide, per failure, whether to skip the
//! page, retry the request, or stop the run.
//!
//! ## Error Categories
//!
//! - **Fetch Errors**: HTTP failures, non-HTML responses, missing pages
//! - **Parse Errors**: documents the HTML parser cannot make sense of
//! - **Remote Errors**: Notion API failures (rate limits, auth, validation)
//! - **Configuration Errors**: invalid settings or config files
//!
//! ## Run Policy
//!
//! ```rust
//! use pagesync_core::Error;
//!
//! fn handle(err: &Error) -> &'static str {
//!     if err.is_fatal() {
//!         "abort run"
//!     } else if err.is_recoverable() {
//!         "retry with backoff"
//!     } else {
//!         "skip page"
//!     }
//! }
//!
//! assert_eq!(handle(&Error::Unauthorized("bad token".into())), "abort run");
//! assert_eq!(handle(&Error::RateLimited { retry_after_ms: Some(1000) }), "retry with backoff");
//! assert_eq!(handle(&Error::Parse("empty document".into())), "skip page");
//! ```

use thiserror::Error;

/// The main error type for pagesync-core operations.
///
/// All public functions in pagesync-core return `Result<T, Error>`. The type
/// converts automatically from the I/O, HTTP and serialization errors it wraps.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers reading URL lists and config files from disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Wraps the underlying `reqwest::Error` for connection, TLS and body
    /// decoding failures.
    ///
    /// ## Recoverability
    ///
    /// Connection and timeout errors are recoverable. Everything else is
    /// treated as permanent for the request that produced it.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A page request returned a non-success status.
    #[error("Fetch failed for {url}: HTTP {status}")]
    Fetch {
        /// URL that was requested.
        url: String,
        /// HTTP status code returned by the server.
        status: u16,
    },

    /// The server answered with something other than HTML.
    ///
    /// GitHub Pages sites routinely link to PDFs, archives and images. Those
    /// responses are skipped rather than mapped.
    #[error("Unsupported content type '{content_type}' at {url}")]
    UnsupportedContent {
        /// URL that was requested.
        url: String,
        /// Content type reported by the server.
        content_type: String,
    },

    /// Parsing operation failed.
    ///
    /// ## Common Causes
    ///
    /// - Empty or whitespace-only response bodies
    /// - Binary content served with an HTML content type
    /// - Malformed sitemap XML
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration is invalid or inaccessible.
    ///
    /// ## Common Causes
    ///
    /// - Invalid TOML syntax in config files
    /// - Missing Notion token or destination page
    /// - Configuration values outside valid ranges
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource was not found.
    ///
    /// Used for 404 page responses and Notion `object_not_found` errors.
    #[error("Not found: {0}")]
    NotFound(String),

    /// URL is malformed or lies outside the site being synced.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The remote store rejected the request with a rate limit.
    ///
    /// Retried with backoff by the Notion client. Surfaces only once the
    /// retry budget is spent.
    #[error("Rate limited by remote store (retry after {retry_after_ms:?} ms)")]
    RateLimited {
        /// Server-suggested wait, when the response carried one.
        retry_after_ms: Option<u64>,
    },

    /// The remote store rejected the credentials.
    ///
    /// Fatal for the run: every later request would fail the same way.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The remote store rejected a request as malformed.
    ///
    /// Fatal for the run: a validation error means the request shape or the
    /// database schema is wrong, not the individual page.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Any other remote store failure.
    #[error("Remote store error (HTTP {status}, {code}): {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Error code reported by the remote API.
        code: String,
        /// Human-readable message reported by the remote API.
        message: String,
    },

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Returns `true` for rate limits, server-side failures, timeouts and
    /// connection errors.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pagesync_core::Error;
    ///
    /// assert!(Error::Timeout("request".into()).is_recoverable());
    /// assert!(Error::RateLimited { retry_after_ms: None }.is_recoverable());
    /// assert!(!Error::Validation("bad property".into()).is_recoverable());
    /// ```
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Remote { status, code, .. } => *status >= 500 || code == "conflict_error",
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Check if the error must stop the whole sync run.
    ///
    /// Authentication, validation and configuration failures apply to every
    /// page, so continuing would only repeat them.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized(_) | Self::Validation(_) | Self::Config(_)
        )
    }

    /// Get the error category as a string identifier.
    ///
    /// Used as a structured logging field and in the sync report.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Fetch { .. } => "fetch",
            Self::UnsupportedContent { .. } => "unsupported_content",
            Self::Parse(_) => "parse",
            Self::Config(_) => "config",
            Self::NotFound(_) => "not_found",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthorized(_) => "unauthorized",
            Self::Validation(_) => "validation",
            Self::Remote { .. } => "remote",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
