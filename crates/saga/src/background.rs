//! Fire-and-forget dispatch for compensation and provisioning calls.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use tokio::sync::Notify;
use tracing::Instrument;

use crate::error::SagaError;

#[derive(Debug, Default)]
struct Inner {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Spawns detached tasks whose outcome is only ever logged.
///
/// Callers never join these tasks. The handle counts in-flight work so a host
/// can drain it before exiting.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatches `task` onto the runtime and returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), SagaError>> + Send + 'static,
    {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard(Arc::clone(&self.inner));

        tokio::spawn(
            async move {
                let _guard = guard;
                let result = AssertUnwindSafe(task)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(SagaError::from_panic(panic)));

                match result {
                    Ok(()) => tracing::info!(task = name, "background task completed"),
                    Err(e) => {
                        metrics::counter!("background_tasks_failed_total", "task" => name)
                            .increment(1);
                        tracing::warn!(task = name, error = %e, "background task failed");
                    }
                }
            }
            .instrument(tracing::Span::current()),
        );
    }

    /// Number of dispatched tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Resolves once no dispatched task is still running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
