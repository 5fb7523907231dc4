//! Registry error taxonomy.

use kube::runtime::watcher;
use thiserror::Error;

/// Errors surfaced by the registry clients.
///
/// `NotFound` is kept apart from every other failure so callers can treat an
/// absent object as empty.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The requested object does not exist.
    #[error("registry object not found: {0}")]
    NotFound(String),

    /// Connection, timeout or body read failure on the key store.
    #[error("transport error on {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// Unexpected HTTP status from the key store.
    #[error("registry returned status {status} for {path}")]
    Status { path: String, status: u16 },

    /// A cluster API request failed.
    #[error("cluster api error: {0}")]
    Cluster(#[from] kube::Error),

    /// A watch failed or the server reported an error on it.
    #[error("watch on {resource} failed: {source}")]
    Watch {
        resource: &'static str,
        #[source]
        source: watcher::Error,
    },

    /// A payload could not be decoded.
    #[error("malformed payload from {path}: {reason}")]
    Decode { path: String, reason: String },

    /// The store no longer holds history back to the requested index.
    #[error("history cleared: requested index {requested}, earliest retained {earliest}")]
    IndexCleared { requested: u64, earliest: u64 },

    #[error("invalid registry url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid cluster url {url}: {source}")]
    ClusterUrl {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
