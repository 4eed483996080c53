//! Repository watcher
//!
//! `HelmRepository` watch events pass an artifact-change predicate, are
//! queued per object key and dispatched by kind to a reconciler that
//! refreshes the profile cache.

mod cancel;
mod controller;
mod dispatch;
mod predicate;
mod queue;
mod reconciler;
mod source;

pub use cancel::{CancelHandle, CancelSignal, RefreshBudget, cancel_pair};
pub use controller::run;
pub use dispatch::{Dispatcher, Reconcile};
pub use predicate::ArtifactChangePredicate;
pub use queue::{QueueEvent, QueueOptions, QueueRunner, WorkItem, WorkQueue, work_queue};
pub use reconciler::{ReconcileOutcome, RepositoryReconciler};
pub use source::watch_repositories;
