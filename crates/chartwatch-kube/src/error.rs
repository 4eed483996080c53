//! Error types for chartwatch-kube

use chartwatch_core::ObjectKey;
use chartwatch_repo::RepoError;
use thiserror::Error;

/// Result type for chartwatch-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while watching repositories or reading releases
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Listing the charts of a repository failed; the cached snapshot is kept
    #[error("repository '{repository}' is unavailable: {source}")]
    UpstreamUnavailable {
        repository: ObjectKey,
        #[source]
        source: RepoError,
    },

    /// Writing to or deleting from the profile cache failed
    #[error("cache operation for '{key}' failed: {source}")]
    Cache {
        key: ObjectKey,
        #[source]
        source: RepoError,
    },

    /// A refresh was cancelled or ran out of time before it was stored
    #[error("refresh of '{key}' cancelled: {reason}")]
    Cancelled { key: ObjectKey, reason: String },

    /// Helm storage record could not be decoded
    #[error("failed to decode the Helm storage object for HelmRelease '{release}': {message}")]
    CorruptStorageRecord { release: String, message: String },

    /// Manifest embedded in a storage record could not be parsed
    #[error("failed to read the Helm storage object for HelmRelease '{release}': {message}")]
    ManifestParse { release: String, message: String },

    /// Helm storage record does not exist
    #[error("storage record '{name}' not found in namespace '{namespace}'")]
    RecordNotFound { namespace: String, name: String },

    /// No reconciler registered for a resource kind
    #[error("no reconciler registered for kind '{kind}'")]
    UnknownKind { kind: String },

    /// Resource is missing fields the watcher relies on
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
            || matches!(self, KubeError::RecordNotFound { .. })
    }

    /// Whether retrying the same work later may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            KubeError::UnknownKind { .. }
                | KubeError::InvalidResource(_)
                | KubeError::Serialization(_)
        )
    }
}
