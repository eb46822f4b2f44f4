//! CLI error handling with semantic exit codes.
//!
//! Errors are categorized so that scheduled runs (cron, CI) can tell a bad
//! token from a flaky network from a partially failed sync.
//!
//! # Exit Code Categories
//!
//! | Code | Category | Description |
//! |------|----------|-------------|
//! | 0 | Success | Command completed successfully |
//! | 1 | `Internal` | Unexpected/internal error |
//! | 2 | `Usage` | Invalid arguments or configuration |
//! | 3 | `Unauthorized` | Notion rejected the token |
//! | 4 | `PartialFailure` | `--fail-on-error` and at least one page failed |
//! | 5 | `Network` | Network or fetch failure |
//! | 6 | `Timeout` | Operation timed out |
//! | 7 | `Validation` | Notion rejected a request as malformed |
//!
//! # Usage
//!
//! ```bash
//! pagesync sync https://octo.github.io/site/ --fail-on-error
//! case $? in
//!     0) echo "Synced" ;;
//!     3) echo "Check NOTION_TOKEN" ;;
//!     4) echo "Some pages failed" ;;
//!     *) echo "Other error" ;;
//! esac
//! ```

use std::fmt;
use std::process::ExitCode;

/// Semantic error category determining the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Unexpected or internal error (exit code 1).
    Internal = 1,

    /// Invalid arguments or configuration (exit code 2).
    ///
    /// Covers a missing token, a malformed config file and URLs that
    /// cannot be parsed.
    Usage = 2,

    /// Notion rejected the credentials (exit code 3).
    Unauthorized = 3,

    /// The run finished but some pages failed (exit code 4).
    ///
    /// Only reported when `--fail-on-error` is given.
    PartialFailure = 4,

    /// Network or fetch failure (exit code 5).
    Network = 5,

    /// Operation timed out (exit code 6).
    Timeout = 6,

    /// Notion rejected a request as malformed (exit code 7).
    Validation = 7,
}

impl ErrorCategory {
    /// Get the exit code for this category.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        self as u8
    }

    /// Create an `ExitCode` from this category.
    #[must_use]
    pub fn as_exit_code(self) -> ExitCode {
        ExitCode::from(self.exit_code())
    }

    /// Get a short description of this error category.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Internal => "internal error",
            Self::Usage => "usage error",
            Self::Unauthorized => "unauthorized",
            Self::PartialFailure => "partial failure",
            Self::Network => "network error",
            Self::Timeout => "timeout",
            Self::Validation => "validation error",
        }
    }

    /// Category of a core library error.
    #[must_use]
    pub fn from_core(err: &pagesync_core::Error) -> Self {
        use pagesync_core::Error;

        match err {
            Error::Unauthorized(_) => Self::Unauthorized,
            Error::Validation(_) => Self::Validation,
            Error::Config(_) | Error::InvalidUrl(_) => Self::Usage,
            Error::Timeout(_) => Self::Timeout,
            Error::Network(e) if e.is_timeout() => Self::Timeout,
            Error::Network(_)
            | Error::Fetch { .. }
            | Error::NotFound(_)
            | Error::UnsupportedContent { .. }
            | Error::RateLimited { .. }
            | Error::Remote { .. } => Self::Network,
            _ => Self::Internal,
        }
    }

    /// Infer the error category from an error message.
    ///
    /// Heuristic fallback for errors that carry no typed category.
    #[must_use]
    pub fn infer_from_message(msg: &str) -> Self {
        let msg_lower = msg.to_lowercase();

        // Before network so "connection timeout" lands here
        if msg_lower.contains("timeout") || msg_lower.contains("timed out") {
            return Self::Timeout;
        }

        if msg_lower.contains("unauthorized") || msg_lower.contains("invalid token") {
            return Self::Unauthorized;
        }

        if msg_lower.contains("network")
            || msg_lower.contains("connection")
            || msg_lower.contains("dns")
            || msg_lower.contains("http")
            || msg_lower.contains("fetch")
            || msg_lower.contains("unreachable")
        {
            return Self::Network;
        }

        if msg_lower.contains("validation") {
            return Self::Validation;
        }

        if msg_lower.contains("invalid argument")
            || msg_lower.contains("missing required")
            || msg_lower.contains("invalid value")
            || msg_lower.contains("configuration")
        {
            return Self::Usage;
        }

        Self::Internal
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A CLI error with a semantic category for exit code mapping.
///
/// Wraps an `anyhow::Error` so the full context chain survives while the
/// process still exits with the right code.
#[derive(Debug)]
pub struct CliError {
    /// The semantic category of this error.
    pub category: ErrorCategory,
    /// The underlying error with full context.
    pub source: anyhow::Error,
}

impl CliError {
    /// Create a new CLI error with explicit category.
    pub fn new(category: ErrorCategory, source: impl Into<anyhow::Error>) -> Self {
        Self {
            category,
            source: source.into(),
        }
    }

    /// Create a usage error.
    pub fn usage(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::Usage, source)
    }

    /// Create a partial-failure error.
    pub fn partial_failure(source: impl Into<anyhow::Error>) -> Self {
        Self::new(ErrorCategory::PartialFailure, source)
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.category.exit_code()
    }

    /// Create an `ExitCode` from this error.
    #[must_use]
    pub fn as_exit_code(&self) -> ExitCode {
        self.category.as_exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Determine the exit code from an `anyhow::Error`.
///
/// Explicit [`CliError`]s win, then core errors anywhere in the chain, then
/// the message heuristic.
#[must_use]
pub fn exit_code_from_error(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return cli_err.exit_code();
    }

    if let Some(core) = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<pagesync_core::Error>())
    {
        return ErrorCategory::from_core(core).exit_code();
    }

    ErrorCategory::infer_from_message(&err.to_string()).exit_code()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};
    use pagesync_core::Error;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ErrorCategory::Internal.exit_code(), 1);
        assert_eq!(ErrorCategory::Usage.exit_code(), 2);
        assert_eq!(ErrorCategory::Unauthorized.exit_code(), 3);
        assert_eq!(ErrorCategory::PartialFailure.exit_code(), 4);
        assert_eq!(ErrorCategory::Network.exit_code(), 5);
        assert_eq!(ErrorCategory::Timeout.exit_code(), 6);
        assert_eq!(ErrorCategory::Validation.exit_code(), 7);
    }

    #[test]
    fn test_core_errors_map_to_categories() {
        assert_eq!(
            ErrorCategory::from_core(&Error::Unauthorized("bad token".into())),
            ErrorCategory::Unauthorized
        );
        assert_eq!(
            ErrorCategory::from_core(&Error::Validation("bad property".into())),
            ErrorCategory::Validation
        );
        assert_eq!(
            ErrorCategory::from_core(&Error::Config("missing token".into())),
            ErrorCategory::Usage
        );
        assert_eq!(
            ErrorCategory::from_core(&Error::Fetch {
                url: "https://o.github.io/".into(),
                status: 500,
            }),
            ErrorCategory::Network
        );
        assert_eq!(
            ErrorCategory::from_core(&Error::Timeout("request".into())),
            ErrorCategory::Timeout
        );
        assert_eq!(
            ErrorCategory::from_core(&Error::Parse("empty".into())),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_exit_code_finds_core_error_behind_context() {
        let err = Err::<(), _>(Error::Unauthorized("nope".into()))
            .context("syncing site")
            .unwrap_err();
        assert_eq!(exit_code_from_error(&err), 3);
    }

    #[test]
    fn test_explicit_category_wins() {
        let err: anyhow::Error = CliError::partial_failure(anyhow!("2 pages failed")).into();
        assert_eq!(exit_code_from_error(&err), 4);
    }

    #[test]
    fn test_inferred_fallback() {
        assert_eq!(exit_code_from_error(&anyhow!("connection refused")), 5);
        assert_eq!(exit_code_from_error(&anyhow!("request timed out")), 6);
        assert_eq!(exit_code_from_error(&anyhow!("something odd")), 1);
    }
}
