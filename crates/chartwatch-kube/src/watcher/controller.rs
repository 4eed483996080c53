//! Wires the watch source, work queue and reconcilers together

use chartwatch_core::WatcherConfig;
use chartwatch_repo::{ChartRepoManager, ProfileCache};
use kube::{Api, Client};
use std::sync::Arc;
use tracing::info;

use super::cancel::{CancelSignal, cancel_pair};
use super::dispatch::Dispatcher;
use super::predicate::ArtifactChangePredicate;
use super::queue::{QueueOptions, work_queue};
use super::reconciler::RepositoryReconciler;
use super::source::watch_repositories;
use crate::crd::HelmRepository;
use crate::error::Result;

/// Keep `cache` in sync with the `HelmRepository` objects of the cluster
///
/// Runs until `cancel` fires. Reconciles in flight at that point are
/// abandoned without writing to the cache.
pub async fn run(
    client: Client,
    config: &WatcherConfig,
    manager: Arc<dyn ChartRepoManager>,
    cache: Arc<dyn ProfileCache>,
    cancel: CancelSignal,
) -> Result<()> {
    let reconciler = RepositoryReconciler::from_config(manager, cache, config);
    let dispatcher = Dispatcher::new().register::<HelmRepository>(Arc::new(reconciler));
    let (queue, runner) = work_queue(Arc::new(dispatcher), QueueOptions::from_config(config));

    // an abandoned refresh is attempted again on the next event for the
    // repository, even when its artifact did not change
    let predicate = ArtifactChangePredicate::new();
    let runner = runner.on_give_up(predicate.reset_on_give_up());

    let api: Api<HelmRepository> = match &config.watch_namespace {
        Some(namespace) => Api::namespaced(client, namespace),
        None => Api::all(client),
    };
    info!(
        namespace = config.watch_namespace.as_deref().unwrap_or("*"),
        concurrency = config.max_concurrent_reconciles,
        "starting repository watcher"
    );

    // the runner stops once the watch ends, whatever the reason
    let (stop, stopped) = cancel_pair();
    let watch = async {
        let result = watch_repositories(api, predicate, queue, cancel).await;
        stop.cancel();
        result
    };
    let (result, ()) = tokio::join!(watch, runner.run(stopped));
    result
}
