//! Navigation manager: at most one mutating operation in flight.
//!
//! Starting a navigation cancels the one that is running and immediately starts the
//! new one under a fresh [`CancellationToken`]. Cancellation is cooperative: the
//! superseded operation keeps running until it observes its token, but its result is
//! never committed because the token is checked before committing.
//!
//! The manager goes back to idle only when the most recently started operation
//! finishes, whichever way it finishes. The `in_progress` flag mirrors this and can be
//! watched for progress indicators.

use crate::model::EngineError;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

#[derive(Debug)]
struct RunningTask {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct NavigationInner {
    last_task_id: u64,
    running: Option<RunningTask>,
}

/// Serializes navigation operations. See the module docs.
#[derive(Debug)]
pub struct NavigationManager {
    inner: Mutex<NavigationInner>,
    in_progress: watch::Sender<bool>,
}

impl Default for NavigationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationManager {
    /// Create an idle manager.
    pub fn new() -> Self {
        let (in_progress, _) = watch::channel(false);
        Self {
            inner: Mutex::new(NavigationInner::default()),
            in_progress,
        }
    }

    /// True while the most recently started operation is running.
    pub fn in_progress(&self) -> bool {
        *self.in_progress.borrow()
    }

    /// Watch the `in_progress` flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.in_progress.subscribe()
    }

    /// Id of the most recently started operation (0 before the first one).
    pub fn last_task_id(&self) -> u64 {
        self.lock().last_task_id
    }

    /// Run `operation`, cancelling whatever navigation is currently running.
    ///
    /// The operation receives the token it must poll. Its result, including
    /// [`EngineError::Cancelled`] and source faults, is returned unchanged.
    pub async fn navigate_view<F, Fut, T>(&self, operation: F) -> Result<T, EngineError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let (id, cancel) = self.begin();
        let _finish = FinishGuard { manager: self, id };

        let result = operation(cancel).await;
        match &result {
            Ok(_) => trace!(task_id = id, "Navigation finished"),
            Err(e) if e.is_cancelled() => debug!(task_id = id, "Navigation cancelled"),
            Err(e) => debug!(task_id = id, error = %e, "Navigation failed"),
        }
        result
    }

    /// Cancel the running operation, if any. The manager stays busy until it finishes.
    pub fn cancel_current(&self) {
        if let Some(task) = &self.lock().running {
            debug!(task_id = task.id, "Cancelling navigation");
            task.cancel.cancel();
        }
    }

    fn begin(&self) -> (u64, CancellationToken) {
        let mut inner = self.lock();
        if let Some(previous) = inner.running.take() {
            debug!(
                task_id = previous.id,
                superseded_by = inner.last_task_id + 1,
                "Cancelling superseded navigation"
            );
            previous.cancel.cancel();
        }
        inner.last_task_id += 1;
        let id = inner.last_task_id;
        let cancel = CancellationToken::new();
        inner.running = Some(RunningTask {
            id,
            cancel: cancel.clone(),
        });
        self.in_progress.send_replace(true);
        (id, cancel)
    }

    fn finish(&self, id: u64) {
        let mut inner = self.lock();
        if inner.running.as_ref().is_some_and(|task| task.id == id) {
            inner.running = None;
            self.in_progress.send_replace(false);
        }
    }

    fn lock(&self) -> MutexGuard<'_, NavigationInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns the manager to idle even when the operation future is dropped early.
struct FinishGuard<'a> {
    manager: &'a NavigationManager,
    id: u64,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        self.manager.finish(self.id);
    }
}
