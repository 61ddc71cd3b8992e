//! Error types for the Arvados client core.
//!
//! # Design
//! Three families, matching how each one travels:
//! - `ConfigError` aborts handle construction; no partial handle is returned.
//! - `TransportError` surfaces through individual call results. Only
//!   `StaleConnection` is ever retried, and only once.
//! - `ClientError` is what [`crate::ClientFactory::get_client`] returns.
//!
//! An unavailable cache directory is not an error at all; it just disables
//! caching.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error produced by the external discovery builder.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Problems with the settings file or required settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A settings line has no `=` separator.
    #[error("{}:{line_number}: expected NAME=VALUE, got {line:?}", path.display())]
    MalformedLine {
        path: PathBuf,
        line_number: usize,
        line: String,
    },

    /// A required setting is absent from both the file and the environment.
    #[error("{0} is not set. Aborting.")]
    MissingSetting(&'static str),

    /// No home directory could be determined for the current user.
    #[error("cannot determine home directory")]
    HomeDirectoryUnknown,
}

/// Failures executing a single HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server closed a pooled connection before we reused it.
    #[error("connection closed by server: {0}")]
    StaleConnection(String),

    /// Any other socket-level failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Trust root or TLS setup failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The request could not be built or the response could not be read.
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether this failure belongs to the class that is retried once.
    pub fn is_stale_connection(&self) -> bool {
        matches!(self, TransportError::StaleConnection(_))
    }
}

/// Errors returned while obtaining an API handle.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The discovery builder rejected the document or failed to fetch it.
    #[error("building API client for {version} failed: {source}")]
    Build {
        version: String,
        #[source]
        source: BoxError,
    },
}
