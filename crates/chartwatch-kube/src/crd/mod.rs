//! Flux custom resources read by chartwatch
//!
//! Only the fields chartwatch relies on are modelled; everything else in
//! the objects is ignored on deserialization.

mod helm_release;
mod helm_repository;

pub use helm_release::{
    CrossNamespaceObjectReference, HelmChartTemplate, HelmChartTemplateSpec, HelmRelease,
    HelmReleaseSpec, HelmReleaseStatus,
};
pub use helm_repository::{Artifact, HelmRepository, HelmRepositorySpec, HelmRepositoryStatus};

use chartwatch_core::ObjectKey;
use kube::ResourceExt;

use crate::error::{KubeError, Result};

/// `(namespace, name)` of a namespaced object
pub fn object_key<K: ResourceExt>(obj: &K) -> Result<ObjectKey> {
    let namespace = obj.namespace().ok_or_else(|| {
        KubeError::InvalidResource(format!("{} has no namespace", obj.name_any()))
    })?;
    Ok(ObjectKey::new(namespace, obj.name_any()))
}

/// Treat empty strings from optional spec fields as unset
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
