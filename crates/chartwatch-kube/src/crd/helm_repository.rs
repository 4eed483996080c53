//! `HelmRepository` (source.toolkit.fluxcd.io)

use chartwatch_repo::RepositoryRef;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::object_key;
use crate::error::Result;

/// A Helm chart repository reconciled by the Flux source controller
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize)]
#[kube(
    group = "source.toolkit.fluxcd.io",
    version = "v1beta2",
    kind = "HelmRepository",
    namespaced,
    status = "HelmRepositoryStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositorySpec {
    /// Repository URL
    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// `default` or `oci`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    #[serde(default)]
    pub suspend: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRepositoryStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Address of the last published index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Last published index artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

/// Output of a source reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

impl Artifact {
    /// Identity of the artifact content, for change detection
    pub fn fingerprint(&self) -> &str {
        self.revision
            .as_deref()
            .or(self.digest.as_deref())
            .unwrap_or(&self.url)
    }
}

impl HelmRepository {
    /// Whether the object has been marked for deletion
    pub fn is_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// The published index artifact, if any
    pub fn artifact(&self) -> Option<&Artifact> {
        self.status.as_ref().and_then(|s| s.artifact.as_ref())
    }

    /// View handed to the repository manager
    pub fn repository_ref(&self) -> Result<RepositoryRef> {
        let mut repo = RepositoryRef::new(object_key(self)?, self.spec.url.clone());
        if let Some(artifact) = self.artifact() {
            repo = repo.with_artifact(artifact.url.clone(), artifact.fingerprint());
        }
        Ok(repo)
    }
}
