//! Error types for the download module.
//!
//! Every variant describes the failure of a single entry. The engine records
//! these per URL and never lets them abort a batch.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while materializing one asset.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Any status other than 200 OK.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The request was redirected to a sign-in page.
    #[error("access denied downloading {url}: redirected to sign-in host {host}")]
    AccessDenied {
        /// The URL that was requested.
        url: String,
        /// Host of the final response.
        host: String,
    },

    /// File system error while writing the asset.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The task fetching the URL panicked or was aborted.
    #[error("download task for {url} failed: {reason}")]
    Task {
        /// The URL the task was fetching.
        url: String,
        /// Panic or abort description.
        reason: String,
    },

    /// The URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, mapping timeouts to
    /// [`DownloadError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an access-denied error.
    pub fn access_denied(url: impl Into<String>, host: impl Into<String>) -> Self {
        Self::AccessDenied {
            url: url.into(),
            host: host.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// URL or path the source error lacks.
