//! Filters repository updates that do not need a refresh

use chartwatch_core::ObjectKey;
use kube::Resource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::crd::{HelmRepository, object_key};

/// Admits an update only when the published artifact changed
///
/// Objects being deleted are always admitted; objects without an artifact
/// never are. Clones share their state, so the work queue can reset a
/// repository whose refresh it abandoned (see [`Self::reset_on_give_up`]).
#[derive(Debug, Default, Clone)]
pub struct ArtifactChangePredicate {
    last: Arc<Mutex<HashMap<ObjectKey, String>>>,
}

impl ArtifactChangePredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&self, repository: &HelmRepository) -> bool {
        let Ok(key) = object_key(repository) else {
            return false;
        };

        if repository.is_deleted() {
            self.last().remove(&key);
            return true;
        }

        let Some(artifact) = repository.artifact() else {
            return false;
        };

        let revision = artifact.fingerprint();
        let mut last = self.last();
        if last.get(&key).is_some_and(|last| last == revision) {
            return false;
        }
        last.insert(key, revision.to_string());
        true
    }

    /// Forget a repository, so its next update is admitted whatever the revision
    pub fn forget(&self, key: &ObjectKey) {
        self.last().remove(key);
    }

    /// Work queue hook that forgets repositories whose refresh was abandoned
    pub fn reset_on_give_up(&self) -> impl Fn(&str, &ObjectKey) + Send + Sync + 'static {
        let predicate = self.clone();
        move |kind, key| {
            if kind == HelmRepository::kind(&()) {
                predicate.forget(key);
            }
        }
    }

    fn last(&self) -> MutexGuard<'_, HashMap<ObjectKey, String>> {
        self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}
