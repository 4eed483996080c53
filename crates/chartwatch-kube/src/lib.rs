//! Chartwatch Kube - Kubernetes integration for chartwatch
//!
//! This crate provides:
//! - **Flux resources**: typed `HelmRepository` and `HelmRelease` objects
//! - **Repository watcher**: keeps the profile cache in sync with `HelmRepository` changes
//! - **Work queue**: per-key serialized, retrying dispatch of watch events
//! - **Helm storage**: decoding of Helm release records stored in Secrets
//! - **Release inventory**: the resource kinds a `HelmRelease` last applied

pub mod crd;
pub mod error;
pub mod inventory;
pub mod storage;
pub mod watcher;

pub use crd::{Artifact, HelmRelease, HelmReleaseSpec, HelmRepository, HelmRepositorySpec};
pub use error::{KubeError, Result};
pub use inventory::{
    InventoryExtractor, ManifestObject, ReleaseStorageRef, extract_kinds, parse_manifest,
};
pub use storage::{
    MockRecordStore, RecordLookups, RecordStore, ReleaseRecord, SecretRecordStore, StoredRecord,
};
pub use watcher::{
    CancelHandle, CancelSignal, Dispatcher, QueueEvent, QueueOptions, Reconcile,
    ReconcileOutcome, RepositoryReconciler, WorkItem, WorkQueue, cancel_pair, work_queue,
};
