//! Repository manager contract
//!
//! The watcher only needs two things from a chart repository: the list of
//! profiles it offers, and the values file of a given chart version.

use async_trait::async_trait;
use chartwatch_core::config::PROFILE_ANNOTATION;
use chartwatch_core::{ChartProfile, ChartReference, ObjectKey};

use crate::error::{RepoError, Result};
use crate::index::ChartEntry;

/// Kube-independent view of a chart repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    /// Identity of the repository resource
    pub key: ObjectKey,
    /// Repository URL from the resource spec, used to resolve relative chart URLs
    pub url: String,
    /// URL of the published index artifact
    pub artifact_url: Option<String>,
    /// Revision of the published artifact
    pub artifact_revision: Option<String>,
}

impl RepositoryRef {
    pub fn new(key: ObjectKey, url: impl Into<String>) -> Self {
        Self {
            key,
            url: url.into(),
            artifact_url: None,
            artifact_revision: None,
        }
    }

    pub fn with_artifact(mut self, url: impl Into<String>, revision: impl Into<String>) -> Self {
        self.artifact_url = Some(url.into());
        self.artifact_revision = Some(revision.into());
        self
    }

    /// The artifact URL, or an error when nothing has been published yet
    pub fn require_artifact(&self) -> Result<&str> {
        self.artifact_url
            .as_deref()
            .ok_or_else(|| RepoError::ArtifactNotReady {
                repository: self.key.to_string(),
            })
    }
}

/// Which charts of an index are listed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Only versions carrying this annotation are listed; `None` lists everything
    pub annotation: Option<String>,
    /// Whether deprecated versions are listed
    pub include_deprecated: bool,
}

impl DiscoveryConfig {
    /// Charts annotated as profiles
    pub fn profiles() -> Self {
        Self::with_annotation(PROFILE_ANNOTATION)
    }

    pub fn with_annotation(annotation: impl Into<String>) -> Self {
        Self {
            annotation: Some(annotation.into()),
            include_deprecated: true,
        }
    }

    /// Every chart in the index
    pub fn all() -> Self {
        Self {
            annotation: None,
            include_deprecated: true,
        }
    }

    /// Whether an index entry passes this filter
    pub fn accepts(&self, entry: &ChartEntry) -> bool {
        if entry.deprecated && !self.include_deprecated {
            return false;
        }
        match &self.annotation {
            Some(annotation) => entry.annotations.contains_key(annotation),
            None => true,
        }
    }
}

/// Access to the charts of a repository
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ChartRepoManager: Send + Sync {
    /// List the charts of a repository that pass the discovery filter
    async fn list_charts(
        &self,
        repo: &RepositoryRef,
        discovery: &DiscoveryConfig,
    ) -> Result<Vec<ChartProfile>>;

    /// Fetch a file (normally `values.yaml`) from one chart version
    async fn get_values(
        &self,
        repo: &RepositoryRef,
        chart: &ChartReference,
        values_file: &str,
    ) -> Result<Vec<u8>>;

    /// Release anything held for a repository that no longer exists
    async fn forget(&self, _key: &ObjectKey) {}
}
