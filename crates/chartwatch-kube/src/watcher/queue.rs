//! Work queue for watch events
//!
//! Items for the same key are processed one at a time, in the order they
//! were enqueued; items for different keys run concurrently up to a limit.
//! Failed items are retried after a backoff unless a newer item for the
//! same key arrived in the meantime. A panicking reconcile fails its item
//! without taking the lane down.

use chartwatch_core::{ObjectKey, WatcherConfig};
use futures::FutureExt;
use kube::Resource;
use kube::api::DynamicObject;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::cancel::CancelSignal;
use super::dispatch::Dispatcher;
use super::reconciler::ReconcileOutcome;
use crate::crd::object_key;
use crate::error::{KubeError, Result};

/// A unit of work: reconcile the object of `kind` identified by `key`
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub kind: String,
    pub key: ObjectKey,
    /// Current state of the object, `None` once it is gone
    pub object: Option<DynamicObject>,
}

impl WorkItem {
    /// Item for an added or updated object
    pub fn apply<K>(object: &K) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        Ok(Self {
            kind: K::kind(&()).into_owned(),
            key: object_key(object)?,
            object: Some(serde_json::from_value(serde_json::to_value(object)?)?),
        })
    }

    /// Item for an object that was removed
    pub fn deleted<K>(key: ObjectKey) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            kind: K::kind(&()).into_owned(),
            key,
            object: None,
        }
    }
}

/// Progress reports, mainly useful in tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Started { key: ObjectKey, attempt: u32 },
    Completed { key: ObjectKey, outcome: ReconcileOutcome },
    Failed { key: ObjectKey, attempt: u32, error: String },
    /// A retry was dropped because a newer item for the key arrived
    Superseded { key: ObjectKey },
    GaveUp { key: ObjectKey },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    pub max_concurrent: usize,
    pub retry_backoff: Duration,
    pub max_retries: u32,
}

impl QueueOptions {
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_reconciles.max(1),
            retry_backoff: config.retry_backoff,
            max_retries: config.max_retries,
        }
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::from_config(&WatcherConfig::default())
    }
}

#[derive(Debug)]
struct Job {
    item: WorkItem,
    attempt: u32,
    /// Generation of the key the job was created for
    generation: u64,
    retry: bool,
}

/// Handle used to feed the queue
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl WorkQueue {
    pub fn enqueue(&self, item: WorkItem) -> Result<()> {
        debug!(kind = %item.kind, key = %item.key, deleted = item.object.is_none(), "enqueue");
        self.tx
            .send(Job {
                item,
                attempt: 0,
                generation: 0,
                retry: false,
            })
            .map_err(|e| KubeError::Cancelled {
                key: e.0.item.key,
                reason: "work queue stopped".to_string(),
            })
    }
}

#[derive(Default)]
struct Lanes {
    /// Keys with a running lane and the items waiting behind it
    pending: HashMap<ObjectKey, VecDeque<Job>>,
    /// Keys with a running lane or a retry in flight
    keys: HashMap<ObjectKey, KeyState>,
}

#[derive(Debug, Default)]
struct KeyState {
    /// Bumped for every new (non-retry) item of the key
    generation: u64,
    /// Retries sleeping through their backoff
    retries: usize,
}

impl Lanes {
    /// Drop the bookkeeping of a key once nothing refers to it
    fn release(&mut self, key: &ObjectKey) {
        let idle = !self.pending.contains_key(key)
            && self.keys.get(key).is_none_or(|state| state.retries == 0);
        if idle {
            self.keys.remove(key);
        }
    }
}

/// Called with the kind and key of an item the queue stopped retrying
pub type GiveUpHook = Box<dyn Fn(&str, &ObjectKey) + Send + Sync>;

/// Processes queued items; created by [`work_queue`]
pub struct QueueRunner {
    rx: mpsc::UnboundedReceiver<Job>,
    queue: WorkQueue,
    shared: Arc<Shared>,
}

struct Shared {
    dispatcher: Arc<Dispatcher>,
    options: QueueOptions,
    lanes: Mutex<Lanes>,
    permits: Semaphore,
    events: Option<mpsc::UnboundedSender<QueueEvent>>,
    on_give_up: Option<GiveUpHook>,
}

impl Shared {
    fn emit(&self, event: QueueEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn give_up(&self, kind: &str, key: ObjectKey) {
        if let Some(hook) = &self.on_give_up {
            hook(kind, &key);
        }
        self.emit(QueueEvent::GaveUp { key });
    }

    fn lanes(&self) -> std::sync::MutexGuard<'_, Lanes> {
        // a poisoned lock only means a lane panicked; the map itself is consistent
        self.lanes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Create a connected queue handle and runner
pub fn work_queue(dispatcher: Arc<Dispatcher>, options: QueueOptions) -> (WorkQueue, QueueRunner) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queue = WorkQueue { tx };
    let shared = Arc::new(Shared {
        dispatcher,
        permits: Semaphore::new(options.max_concurrent.max(1)),
        options,
        lanes: Mutex::new(Lanes::default()),
        events: None,
        on_give_up: None,
    });
    (queue.clone(), QueueRunner { rx, queue, shared })
}

impl QueueRunner {
    /// Report progress on the returned channel
    pub fn with_events(mut self) -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.events = Some(tx),
            None => warn!("queue already running, events not attached"),
        }
        (self, rx)
    }

    /// Run `hook` whenever an item is abandoned, so whatever filtered the
    /// events feeding it can let the next one through
    pub fn on_give_up(mut self, hook: impl Fn(&str, &ObjectKey) + Send + Sync + 'static) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.on_give_up = Some(Box::new(hook)),
            None => warn!("queue already running, give-up hook not attached"),
        }
        self
    }

    /// Items received but not yet picked up
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Process items until `cancel` fires, then wait for running lanes
    pub async fn run(mut self, cancel: CancelSignal) {
        let mut lanes = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(joined) = lanes.join_next(), if !lanes.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "work queue lane aborted");
                    }
                }
                job = self.rx.recv() => match job {
                    Some(job) => self.schedule(job, &mut lanes, &cancel),
                    None => break,
                },
            }
        }

        info!(running = lanes.len(), "work queue stopping");
        while lanes.join_next().await.is_some() {}
    }

    fn schedule(&self, mut job: Job, lanes: &mut JoinSet<()>, cancel: &CancelSignal) {
        let key = job.item.key.clone();
        let mut state = self.shared.lanes();

        let tracked = state.keys.entry(key.clone()).or_default();
        if job.retry {
            tracked.retries = tracked.retries.saturating_sub(1);
            if job.generation != tracked.generation {
                state.release(&key);
                drop(state);
                debug!(%key, "retry superseded by a newer item");
                self.shared.emit(QueueEvent::Superseded { key });
                return;
            }
        } else {
            tracked.generation += 1;
            job.generation = tracked.generation;
        }

        if let Some(waiting) = state.pending.get_mut(&key) {
            waiting.push_back(job);
            return;
        }
        state.pending.insert(key, VecDeque::new());
        drop(state);

        lanes.spawn(run_lane(
            self.shared.clone(),
            self.queue.clone(),
            job,
            cancel.clone(),
        ));
    }
}

/// Process the items of one key until none are left
async fn run_lane(shared: Arc<Shared>, queue: WorkQueue, first: Job, cancel: CancelSignal) {
    let key = first.item.key.clone();
    let mut next = Some(first);

    while let Some(job) = next {
        if cancel.is_cancelled() {
            break;
        }

        let kind = job.item.kind.clone();
        let attempt = job.attempt;
        let processed = AssertUnwindSafe(process(&shared, &queue, job, &cancel))
            .catch_unwind()
            .await;
        if let Err(panic) = processed {
            let message = panic_message(panic.as_ref());
            error!(%key, %kind, panic = %message, "reconcile panicked, giving up");
            shared.emit(QueueEvent::Failed {
                key: key.clone(),
                attempt,
                error: format!("reconcile panicked: {}", message),
            });
            shared.give_up(&kind, key.clone());
        }

        let mut state = shared.lanes();
        next = state.pending.get_mut(&key).and_then(VecDeque::pop_front);
        if next.is_none() {
            state.pending.remove(&key);
            state.release(&key);
        }
    }

    if cancel.is_cancelled() {
        shared.lanes().pending.remove(&key);
    }
}

async fn process(shared: &Shared, queue: &WorkQueue, job: Job, cancel: &CancelSignal) {
    let Ok(_permit) = shared.permits.acquire().await else {
        return;
    };

    let key = job.item.key.clone();
    shared.emit(QueueEvent::Started {
        key: key.clone(),
        attempt: job.attempt,
    });

    match shared.dispatcher.dispatch(&job.item, cancel).await {
        Ok(outcome) => {
            debug!(%key, ?outcome, "reconciled");
            shared.emit(QueueEvent::Completed { key, outcome });
        }
        Err(e) => {
            shared.emit(QueueEvent::Failed {
                key: key.clone(),
                attempt: job.attempt,
                error: e.to_string(),
            });

            if cancel.is_cancelled() {
                return;
            }
            if !e.is_retryable() || job.attempt >= shared.options.max_retries {
                error!(%key, attempts = job.attempt + 1, error = %e, "reconcile failed, giving up");
                shared.give_up(&job.item.kind, key);
                return;
            }

            warn!(
                %key,
                attempt = job.attempt + 1,
                backoff = ?shared.options.retry_backoff,
                error = %e,
                "reconcile failed, retrying"
            );
            shared.lanes().keys.entry(key).or_default().retries += 1;
            schedule_retry(queue.clone(), job, shared.options.retry_backoff, cancel.clone());
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn schedule_retry(queue: WorkQueue, job: Job, backoff: Duration, cancel: CancelSignal) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(backoff) => {
                let _ = queue.tx.send(Job {
                    attempt: job.attempt + 1,
                    retry: true,
                    ..job
                });
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::cancel::cancel_pair;
    use crate::watcher::dispatch::Reconcile;
    use crate::crd::HelmRepository;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the order of calls, panics on the first `panics` of them
    /// and fails the first `failures` that complete
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        running: AtomicUsize,
        peak: AtomicUsize,
        failures: AtomicUsize,
        panics: AtomicUsize,
        delay: Duration,
    }

    impl Recorder {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        async fn record(&self, label: String) -> Result<ReconcileOutcome> {
            if take_one(&self.panics) {
                panic!("reconciler bug while handling {label}");
            }

            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.calls.lock().unwrap().push(label.clone());
            self.running.fetch_sub(1, Ordering::SeqCst);

            if take_one(&self.failures) {
                return Err(KubeError::RecordNotFound {
                    namespace: "test".to_string(),
                    name: label,
                });
            }
            Ok(ReconcileOutcome::NotReady)
        }
    }

    fn take_one(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl Reconcile for Recorder {
        async fn apply(&self, object: &DynamicObject, _: &CancelSignal) -> Result<ReconcileOutcome> {
            let name = object.metadata.name.clone().unwrap_or_default();
            let label = object
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get("step").cloned())
                .unwrap_or_default();
            self.record(format!("{name}:{label}")).await
        }

        async fn cleanup(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
            self.record(format!("{}:deleted", key.name)).await?;
            Ok(ReconcileOutcome::Deleted)
        }
    }

    fn item(name: &str, step: &str) -> WorkItem {
        let mut repo = HelmRepository::new(name, Default::default());
        repo.metadata.namespace = Some("flux-system".to_string());
        repo.metadata.labels = Some([("step".to_string(), step.to_string())].into());
        WorkItem::apply(&repo).unwrap()
    }

    fn start(
        recorder: Arc<Recorder>,
        options: QueueOptions,
    ) -> (WorkQueue, mpsc::UnboundedReceiver<QueueEvent>, crate::watcher::CancelHandle) {
        let dispatcher = Dispatcher::new().register::<HelmRepository>(recorder);
        let (queue, runner) = work_queue(Arc::new(dispatcher), options);
        let (runner, events) = runner.with_events();
        let (handle, signal) = cancel_pair();
        tokio::spawn(runner.run(signal));
        (queue, events, handle)
    }

    async fn wait_for(
        events: &mut mpsc::UnboundedReceiver<QueueEvent>,
        done: impl Fn(&QueueEvent) -> bool,
        count: usize,
    ) -> Vec<QueueEvent> {
        let mut seen = Vec::new();
        let mut matched = 0;
        while matched < count {
            let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
                .await
                .expect("timed out waiting for queue events")
                .expect("event channel closed");
            if done(&event) {
                matched += 1;
            }
            seen.push(event);
        }
        seen
    }

    fn options(max_concurrent: usize) -> QueueOptions {
        QueueOptions {
            max_concurrent,
            retry_backoff: Duration::from_millis(10),
            max_retries: 2,
        }
    }

    #[tokio::test]
    async fn test_same_key_runs_in_order() {
        let recorder = Arc::new(Recorder::with_delay(Duration::from_millis(5)));
        let (queue, mut events, _handle) = start(recorder.clone(), options(4));

        for step in ["1", "2", "3"] {
            queue.enqueue(item("weaveworks", step)).unwrap();
        }
        queue
            .enqueue(WorkItem::deleted::<HelmRepository>(ObjectKey::new(
                "flux-system",
                "weaveworks",
            )))
            .unwrap();

        wait_for(&mut events, |e| matches!(e, QueueEvent::Completed { .. }), 4).await;
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["weaveworks:1", "weaveworks:2", "weaveworks:3", "weaveworks:deleted"]
        );
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_run_concurrently() {
        let recorder = Arc::new(Recorder::with_delay(Duration::from_millis(50)));
        let (queue, mut events, _handle) = start(recorder.clone(), options(4));

        for name in ["a", "b", "c"] {
            queue.enqueue(item(name, "1")).unwrap();
        }

        wait_for(&mut events, |e| matches!(e, QueueEvent::Completed { .. }), 3).await;
        assert!(recorder.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_concurrency_limit() {
        let recorder = Arc::new(Recorder::with_delay(Duration::from_millis(20)));
        let (queue, mut events, _handle) = start(recorder.clone(), options(1));

        for name in ["a", "b", "c"] {
            queue.enqueue(item(name, "1")).unwrap();
        }

        wait_for(&mut events, |e| matches!(e, QueueEvent::Completed { .. }), 3).await;
        assert_eq!(recorder.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_item_is_retried() {
        let recorder = Arc::new(Recorder::default());
        recorder.failures.store(1, Ordering::SeqCst);
        let (queue, mut events, _handle) = start(recorder.clone(), options(2));

        queue.enqueue(item("weaveworks", "1")).unwrap();

        let seen = wait_for(&mut events, |e| matches!(e, QueueEvent::Completed { .. }), 1).await;
        assert!(seen.iter().any(|e| matches!(e, QueueEvent::Failed { attempt: 0, .. })));
        assert!(seen.iter().any(|e| matches!(e, QueueEvent::Started { attempt: 1, .. })));
        assert_eq!(recorder.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let recorder = Arc::new(Recorder::default());
        recorder.failures.store(10, Ordering::SeqCst);
        let (queue, mut events, _handle) = start(recorder.clone(), options(2));

        queue.enqueue(item("weaveworks", "1")).unwrap();

        wait_for(&mut events, |e| matches!(e, QueueEvent::GaveUp { .. }), 1).await;
        // first attempt plus two retries
        assert_eq!(recorder.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_superseded_by_newer_item() {
        let recorder = Arc::new(Recorder::default());
        recorder.failures.store(1, Ordering::SeqCst);
        let (queue, mut events, _handle) = start(
            recorder.clone(),
            QueueOptions {
                retry_backoff: Duration::from_millis(100),
                ..options(2)
            },
        );

        queue.enqueue(item("weaveworks", "1")).unwrap();
        wait_for(&mut events, |e| matches!(e, QueueEvent::Failed { .. }), 1).await;
        queue.enqueue(item("weaveworks", "2")).unwrap();

        wait_for(&mut events, |e| matches!(e, QueueEvent::Superseded { .. }), 1).await;
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["weaveworks:1", "weaveworks:2"]
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_runner() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new().register::<HelmRepository>(recorder.clone());
        let (queue, runner) = work_queue(Arc::new(dispatcher), options(2));
        let (handle, signal) = cancel_pair();
        let running = tokio::spawn(runner.run(signal));

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();

        assert!(queue.enqueue(item("weaveworks", "1")).is_err());
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panic_fails_item_and_lane_continues() {
        let recorder = Arc::new(Recorder::default());
        recorder.panics.store(1, Ordering::SeqCst);
        let (queue, mut events, _handle) = start(recorder.clone(), options(2));

        queue.enqueue(item("weaveworks", "1")).unwrap();
        queue.enqueue(item("weaveworks", "2")).unwrap();

        let seen = wait_for(&mut events, |e| matches!(e, QueueEvent::Completed { .. }), 1).await;
        assert!(seen.iter().any(|e| matches!(
            e,
            QueueEvent::Failed { attempt: 0, error, .. } if error.contains("panicked")
        )));
        assert!(seen.iter().any(|e| matches!(e, QueueEvent::GaveUp { .. })));
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["weaveworks:2"]);

        // the key is not left marked as busy
        queue.enqueue(item("weaveworks", "3")).unwrap();
        wait_for(&mut events, |e| matches!(e, QueueEvent::Completed { .. }), 1).await;
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["weaveworks:2", "weaveworks:3"]
        );
    }

    #[tokio::test]
    async fn test_give_up_hook_receives_item() {
        let recorder = Arc::new(Recorder::default());
        recorder.failures.store(10, Ordering::SeqCst);
        let given_up = Arc::new(Mutex::new(Vec::new()));

        let dispatcher = Dispatcher::new().register::<HelmRepository>(recorder.clone());
        let (queue, runner) = work_queue(Arc::new(dispatcher), options(2));
        let runner = runner.on_give_up({
            let given_up = given_up.clone();
            move |kind, key| given_up.lock().unwrap().push((kind.to_string(), key.clone()))
        });
        let (runner, mut events) = runner.with_events();
        let (_handle, signal) = cancel_pair();
        tokio::spawn(runner.run(signal));

        queue.enqueue(item("weaveworks", "1")).unwrap();
        wait_for(&mut events, |e| matches!(e, QueueEvent::GaveUp { .. }), 1).await;

        assert_eq!(
            *given_up.lock().unwrap(),
            vec![(
                "HelmRepository".to_string(),
                ObjectKey::new("flux-system", "weaveworks")
            )]
        );
    }

    #[tokio::test]
    async fn test_key_state_released_when_idle() {
        let recorder = Arc::new(Recorder::default());
        recorder.failures.store(1, Ordering::SeqCst);
        let dispatcher = Dispatcher::new().register::<HelmRepository>(recorder.clone());
        let (queue, runner) = work_queue(Arc::new(dispatcher), options(2));
        let (runner, mut events) = runner.with_events();
        let shared = runner.shared.clone();
        let (_handle, signal) = cancel_pair();
        tokio::spawn(runner.run(signal));

        for name in ["a", "b", "c"] {
            queue.enqueue(item(name, "1")).unwrap();
        }
        wait_for(&mut events, |e| matches!(e, QueueEvent::Completed { .. }), 3).await;

        tokio::time::timeout(Duration::from_secs(5), async {
            while !shared.lanes().keys.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("key state kept after the queue went idle");
        assert!(shared.lanes().pending.is_empty());
    }
}
