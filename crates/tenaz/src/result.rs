//! Result and error types for Tenaz.

use thiserror::Error;

/// Result type for Tenaz operations
pub type TenazResult<T> = Result<T, TenazError>;

/// Errors that can occur in Tenaz
///
/// "Element not found within the timeout" is deliberately absent: that is an
/// expected outcome reported through [`crate::Resolution::NotFound`], never an
/// error. Everything here either aborts the current step or the whole scenario.
#[derive(Debug, Error)]
pub enum TenazError {
    /// Browser executable not found
    #[error("Browser not found. Install Chromium or set CHROMIUM_PATH")]
    BrowserNotFound,

    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunchError {
        /// Error message
        message: String,
    },

    /// Connection to browser failed
    #[error("Failed to connect to browser: {message}")]
    ConnectionFailed {
        /// Error message
        message: String,
    },

    /// The page (or its browser target) was closed underneath a running step
    #[error("Page closed: {message}")]
    PageClosed {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    NavigationError {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Any other failure reported by the page driver
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Empty candidate sequence or indicator set
    #[error("Invalid candidate set: {message}")]
    InvalidCandidateSet {
        /// Error message
        message: String,
    },

    /// Selector expression could not be parsed
    #[error("Invalid selector `{input}`: {message}")]
    InvalidSelector {
        /// Offending input
        input: String,
        /// Error message
        message: String,
    },

    /// The outer scenario deadline expired
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    ScreenshotError {
        /// Error message
        message: String,
    },

    /// Assertion failed
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Unknown named target or indicator set
    #[error("Unknown target: {name}")]
    UnknownTarget {
        /// Requested name
        name: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl TenazError {
    /// Create a driver error
    #[must_use]
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a page-closed error
    #[must_use]
    pub fn page_closed(message: impl Into<String>) -> Self {
        Self::PageClosed {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid selector error
    #[must_use]
    pub fn invalid_selector(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSelector {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create an invalid candidate set error
    #[must_use]
    pub fn invalid_candidates(message: impl Into<String>) -> Self {
        Self::InvalidCandidateSet {
            message: message.into(),
        }
    }

    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Whether this error comes from the browser environment
    /// (page, navigation, connection) rather than from the caller.
    #[must_use]
    pub const fn is_environment(&self) -> bool {
        matches!(
            self,
            Self::BrowserNotFound
                | Self::BrowserLaunchError { .. }
                | Self::ConnectionFailed { .. }
                | Self::PageClosed { .. }
                | Self::NavigationError { .. }
                | Self::Driver { .. }
                | Self::ScreenshotError { .. }
        )
    }

    /// Whether the page or browser connection is gone for good
    #[must_use]
    pub const fn ends_session(&self) -> bool {
        matches!(
            self,
            Self::PageClosed { .. } | Self::ConnectionFailed { .. } | Self::BrowserNotFound
        )
    }

    /// Whether this error is a caller programming error that must not be retried
    #[must_use]
    pub const fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::InvalidCandidateSet { .. }
                | Self::InvalidSelector { .. }
                | Self::UnknownTarget { .. }
        )
    }
}
