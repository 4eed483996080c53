//! Cancellation signals and refresh budgets

use chartwatch_core::ObjectKey;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{KubeError, Result};

/// Create a connected cancel handle and signal
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

/// Owner side of a cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every signal derived from this handle
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: Some(self.tx.subscribe()),
        }
    }
}

/// Observer side of a cancellation signal, cheap to clone
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancelled; never resolves if the handle is dropped uncancelled
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Cancellation plus deadline bounding one refresh
#[derive(Debug, Clone)]
pub struct RefreshBudget {
    signal: CancelSignal,
    deadline: Instant,
}

impl RefreshBudget {
    pub fn new(signal: CancelSignal, timeout: Duration) -> Self {
        Self {
            signal,
            deadline: Instant::now() + timeout,
        }
    }

    /// Whether the refresh may still write its result
    pub fn check(&self, key: &ObjectKey) -> Result<()> {
        if self.signal.is_cancelled() {
            return Err(cancelled(key, "shutdown requested"));
        }
        if Instant::now() >= self.deadline {
            return Err(cancelled(key, "refresh timed out"));
        }
        Ok(())
    }

    /// Run `fut` unless the budget runs out first
    pub async fn run<F: Future>(&self, key: &ObjectKey, fut: F) -> Result<F::Output> {
        tokio::select! {
            biased;
            _ = self.signal.cancelled() => Err(cancelled(key, "shutdown requested")),
            _ = tokio::time::sleep_until(self.deadline) => Err(cancelled(key, "refresh timed out")),
            output = fut => Ok(output),
        }
    }
}

fn cancelled(key: &ObjectKey, reason: &str) -> KubeError {
    KubeError::Cancelled {
        key: key.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ObjectKey {
        ObjectKey::new("flux-system", "weaveworks")
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (handle, signal) = cancel_pair();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.cancelled().await }
        });
        handle.cancel();
        waiter.await.unwrap();
        assert!(signal.is_cancelled());
        assert!(handle.signal().is_cancelled());
    }

    #[tokio::test]
    async fn test_never() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(timed_out.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_deadline() {
        let budget = RefreshBudget::new(CancelSignal::never(), Duration::from_secs(5));
        let err = budget
            .run(&key(), tokio::time::sleep(Duration::from_secs(60)))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Cancelled { .. }));
        assert!(budget.check(&key()).is_err());
    }

    #[tokio::test]
    async fn test_budget_completes() {
        let budget = RefreshBudget::new(CancelSignal::never(), Duration::from_secs(5));
        assert_eq!(budget.run(&key(), async { 42 }).await.unwrap(), 42);
        assert!(budget.check(&key()).is_ok());
    }

    #[tokio::test]
    async fn test_budget_cancelled() {
        let (handle, signal) = cancel_pair();
        let budget = RefreshBudget::new(signal, Duration::from_secs(5));
        handle.cancel();
        assert!(budget.run(&key(), std::future::pending::<()>()).await.is_err());
        assert!(budget.check(&key()).is_err());
    }
}
