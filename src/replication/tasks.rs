use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Supervised group for replication attempts.
///
/// Attempts outlive the write that spawned them, so they are owned here
/// rather than detached. Finished tasks are reaped whenever a new one is
/// spawned, and [`ReplicationTasks::drain`] waits for everything still
/// running.
#[derive(Clone, Default)]
pub struct ReplicationTasks {
    set: Arc<Mutex<JoinSet<()>>>,
    in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight counter even if the attempt panics.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ReplicationTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard(self.in_flight.clone());

        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(finished) = set.try_join_next() {
            if let Err(e) = finished {
                warn!(error = %e, "Replication task did not complete");
            }
        }
        set.spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    /// Number of attempts that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every spawned attempt has completed.
    ///
    /// Tasks spawned while draining are waited for as well.
    pub async fn drain(&self) {
        loop {
            let mut set = std::mem::take(&mut *self.set.lock().unwrap_or_else(PoisonError::into_inner));
            if set.is_empty() {
                break;
            }
            debug!(remaining = set.len(), "Draining replication tasks");
            while let Some(finished) = set.join_next().await {
                if let Err(e) = finished {
                    warn!(error = %e, "Replication task did not complete");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drain_waits_for_all_tasks() {
        let tasks = ReplicationTasks::new();
        let done = Arc::new(AtomicUsize::new(0));
        for i in 0..10 {
            let done = done.clone();
            tasks.spawn(async move {
                tokio::time::sleep(Duration::from_millis(5 * i)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(tasks.in_flight(), 10);

        tasks.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn panicking_task_is_not_counted_as_running() {
        let tasks = ReplicationTasks::new();
        tasks.spawn(async { panic!("boom") });
        tasks.drain().await;
        assert_eq!(tasks.in_flight(), 0);
    }

    #[tokio::test]
    async fn drain_on_empty_group_returns() {
        ReplicationTasks::new().drain().await;
    }
}
