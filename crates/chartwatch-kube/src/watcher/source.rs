//! Feeds `HelmRepository` watch events into the work queue

use futures::StreamExt;
use kube::Api;
use kube::runtime::{WatchStreamExt, watcher};
use tracing::{debug, info, warn};

use super::cancel::CancelSignal;
use super::predicate::ArtifactChangePredicate;
use super::queue::{WorkItem, WorkQueue};
use crate::crd::{HelmRepository, object_key};
use crate::error::Result;

/// Watch repositories until `cancel` fires or the queue stops
///
/// Updates are filtered through `predicate`; pass a clone of one hooked
/// into the queue with [`ArtifactChangePredicate::reset_on_give_up`].
pub async fn watch_repositories(
    api: Api<HelmRepository>,
    predicate: ArtifactChangePredicate,
    queue: WorkQueue,
    cancel: CancelSignal,
) -> Result<()> {
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    futures::pin_mut!(stream);

    info!("watching HelmRepository objects");
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.next() => event,
        };

        match event {
            Some(Ok(event)) => handle_event(event, &predicate, &queue)?,
            Some(Err(e)) => warn!(error = %e, "HelmRepository watch failed, retrying"),
            None => break,
        }
    }

    info!("stopped watching HelmRepository objects");
    Ok(())
}

fn handle_event(
    event: watcher::Event<HelmRepository>,
    predicate: &ArtifactChangePredicate,
    queue: &WorkQueue,
) -> Result<()> {
    match event {
        watcher::Event::Apply(repository) | watcher::Event::InitApply(repository) => {
            if predicate.admit(&repository) {
                queue.enqueue(WorkItem::apply(&repository)?)?;
            } else {
                debug!(name = ?repository.metadata.name, "artifact unchanged, skipping");
            }
        }
        watcher::Event::Delete(repository) => {
            let key = object_key(&repository)?;
            predicate.forget(&key);
            queue.enqueue(WorkItem::deleted::<HelmRepository>(key))?;
        }
        watcher::Event::Init | watcher::Event::InitDone => {}
    }
    Ok(())
}
