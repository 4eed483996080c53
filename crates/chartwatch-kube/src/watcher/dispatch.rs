//! Kind dispatch table
//!
//! Work items carry the kind of the object they were produced for; the
//! dispatcher routes each one to the reconciler registered for that kind.

use async_trait::async_trait;
use chartwatch_core::ObjectKey;
use kube::Resource;
use kube::api::DynamicObject;
use std::collections::HashMap;
use std::sync::Arc;

use super::cancel::CancelSignal;
use super::queue::WorkItem;
use super::reconciler::{ReconcileOutcome, RepositoryReconciler};
use crate::crd::HelmRepository;
use crate::error::{KubeError, Result};

/// A reconciler for one resource kind
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Handle an added or updated object
    async fn apply(&self, object: &DynamicObject, cancel: &CancelSignal) -> Result<ReconcileOutcome>;

    /// Handle an object that no longer exists
    async fn cleanup(&self, key: &ObjectKey) -> Result<ReconcileOutcome>;
}

#[async_trait]
impl Reconcile for RepositoryReconciler {
    async fn apply(&self, object: &DynamicObject, cancel: &CancelSignal) -> Result<ReconcileOutcome> {
        let repository: HelmRepository = serde_json::from_value(serde_json::to_value(object)?)?;
        self.reconcile(&repository, cancel).await
    }

    async fn cleanup(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        self.remove(key).await
    }
}

/// Maps resource kinds to their reconcilers
#[derive(Default, Clone)]
pub struct Dispatcher {
    reconcilers: HashMap<String, Arc<dyn Reconcile>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the reconciler of `K`, replacing any previous one
    pub fn register<K>(mut self, reconciler: Arc<dyn Reconcile>) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        self.reconcilers.insert(K::kind(&()).into_owned(), reconciler);
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.reconcilers.keys().map(String::as_str)
    }

    /// Route a work item to the reconciler of its kind
    pub async fn dispatch(&self, item: &WorkItem, cancel: &CancelSignal) -> Result<ReconcileOutcome> {
        let reconciler = self
            .reconcilers
            .get(&item.kind)
            .ok_or_else(|| KubeError::UnknownKind {
                kind: item.kind.clone(),
            })?;

        match &item.object {
            Some(object) => reconciler.apply(object, cancel).await,
            None => reconciler.cleanup(&item.key).await,
        }
    }
}
