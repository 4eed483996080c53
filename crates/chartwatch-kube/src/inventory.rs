//! Release inventories
//!
//! Recovers the set of resource kinds a `HelmRelease` last applied, by
//! reading the manifest stored in its Helm storage record.

use chartwatch_core::ResourceKind;
use kube::ResourceExt;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

use crate::crd::HelmRelease;
use crate::error::{KubeError, Result};
use crate::storage::{RecordStore, decode_release_manifest, storage_record_name};

/// Identity of one object in a rendered manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestObject {
    pub api_version: String,
    pub kind: String,
    pub name: Option<String>,
    pub namespace: Option<String>,
}

impl ManifestObject {
    pub fn resource_kind(&self) -> ResourceKind {
        ResourceKind::from_api_version(&self.api_version, &self.kind)
    }

    fn from_value(value: &serde_yaml::Value, release: &str) -> Result<Self> {
        let mapping = value.as_mapping().ok_or_else(|| KubeError::ManifestParse {
            release: release.to_string(),
            message: "manifest document is not a mapping".to_string(),
        })?;

        let field = |name: &str| mapping.get(name).and_then(|v| v.as_str()).map(str::to_string);
        let metadata = |name: &str| {
            mapping
                .get("metadata")
                .and_then(|m| m.get(name))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let missing = |what: &str| KubeError::ManifestParse {
            release: release.to_string(),
            message: format!("manifest document has no {what}"),
        };

        Ok(Self {
            api_version: field("apiVersion").filter(|v| !v.is_empty()).ok_or_else(|| missing("apiVersion"))?,
            kind: field("kind").filter(|v| !v.is_empty()).ok_or_else(|| missing("kind"))?,
            name: metadata("name"),
            namespace: metadata("namespace"),
        })
    }
}

/// Split a multi-document manifest into its objects
///
/// Empty documents are skipped. `*List` documents are flattened into their items.
pub fn parse_manifest(manifest: &str, release: &str) -> Result<Vec<ManifestObject>> {
    let mut objects = Vec::new();

    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| KubeError::ManifestParse {
            release: release.to_string(),
            message: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }

        let object = ManifestObject::from_value(&value, release)?;
        match value.get("items").and_then(|items| items.as_sequence()) {
            Some(items) if object.kind.ends_with("List") => {
                for item in items {
                    objects.push(ManifestObject::from_value(item, release)?);
                }
            }
            _ => objects.push(object),
        }
    }

    Ok(objects)
}

/// Distinct resource kinds in first-occurrence order
pub fn extract_kinds(objects: &[ManifestObject]) -> Vec<ResourceKind> {
    let mut seen = HashSet::new();
    objects
        .iter()
        .map(ManifestObject::resource_kind)
        .filter(|kind| seen.insert(kind.id()))
        .collect()
}

/// Location of the storage record of a release's last revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseStorageRef {
    /// `namespace/name` of the `HelmRelease`, for diagnostics
    pub release: String,
    pub namespace: String,
    /// Helm release name
    pub name: String,
    pub revision: i64,
}

impl ReleaseStorageRef {
    pub fn for_release(release: &HelmRelease) -> Self {
        let release_namespace = release.namespace().unwrap_or_default();
        let release_name = release.name_any();

        let namespace = release
            .spec
            .storage_namespace()
            .map(str::to_string)
            .unwrap_or_else(|| release_namespace.clone());

        let name = match (release.spec.release_name(), release.spec.target_namespace()) {
            (Some(name), _) => name.to_string(),
            (None, Some(target)) => format!("{target}-{release_name}"),
            (None, None) => release_name.clone(),
        };

        Self {
            release: format!("{release_namespace}/{release_name}"),
            namespace,
            name,
            revision: release.last_release_revision(),
        }
    }

    /// Whether any revision was ever installed
    pub fn is_installed(&self) -> bool {
        self.revision >= 1
    }

    pub fn record_name(&self) -> String {
        storage_record_name(&self.name, self.revision)
    }
}

/// Reads release inventories from a record store
pub struct InventoryExtractor<S> {
    store: S,
}

impl<S: RecordStore> InventoryExtractor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resource kinds applied by the last revision of a release
    ///
    /// A release that was never installed has an empty inventory.
    #[tracing::instrument(skip(self, release), fields(namespace = ?release.namespace(), name = %release.name_any()))]
    pub async fn release_inventory(&self, release: &HelmRelease) -> Result<Vec<ResourceKind>> {
        let location = ReleaseStorageRef::for_release(release);
        if !location.is_installed() {
            debug!("release has no installed revision");
            return Ok(Vec::new());
        }

        let record = self
            .store
            .get_record(&location.namespace, &location.record_name())
            .await?;
        let raw = record.release_data().ok_or_else(|| KubeError::CorruptStorageRecord {
            release: location.release.clone(),
            message: format!("storage record '{}' has no release data", record.name),
        })?;

        let manifest = decode_release_manifest(raw, &location.release)?;
        let objects = parse_manifest(&manifest, &location.release)?;
        let kinds = extract_kinds(&objects);
        debug!(objects = objects.len(), kinds = kinds.len(), "release inventory extracted");
        Ok(kinds)
    }
}
