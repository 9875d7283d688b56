//! A bounded pool of workers for fire-and-forget background work (audit
//! writes, webhook deliveries) that must never be allowed to spawn unbounded
//! tasks when its upstream is a request handler running on every inbound call.
//!
//! Unlike [`LxTask::spawn`], which is for long-lived or must-join work, this
//! pool is for the opposite case: work we're fine losing on overload or
//! shutdown, as long as we never silently accumulate unbounded queued tasks.
//!
//! [`LxTask::spawn`]: crate::task::LxTask::spawn

use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{notify_once::NotifyOnce, task::LxTask};

/// A unit of fire-and-forget work submitted to the [`WorkerPool`].
pub type Job = Box<dyn FnOnce() -> BoxFuture + Send + 'static>;
type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Returned by [`WorkerPool::submit`] when the bounded queue is full.
#[derive(Debug, thiserror::Error)]
#[error("worker pool queue is full, job dropped")]
pub struct QueueFull;

/// A bounded pool of `num_workers` tasks pulling jobs off a single bounded
/// mpsc queue of depth `queue_capacity`.
///
/// - [`WorkerPool::submit`] never blocks: if the queue is full, it returns
///   [`QueueFull`] immediately and the caller is expected to log-and-drop.
/// - [`WorkerPool::close`] stops intake (further `submit` calls fail), then
///   waits up to `drain_deadline` for already-queued jobs to finish before
///   returning, cancelling whatever hasn't run by then.
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
    shutdown: NotifyOnce,
}

impl WorkerPool {
    /// Spawn `num_workers` tasks draining a shared bounded queue of capacity
    /// `queue_capacity`. Returns the pool handle plus the worker [`LxTask`]s,
    /// which the caller should register with its static-task shutdown join
    /// (see [`crate::task::try_join_tasks_and_shutdown`]).
    pub fn spawn(
        name: &'static str,
        num_workers: usize,
        queue_capacity: usize,
    ) -> (Self, Vec<LxTask<()>>) {
        assert!(num_workers > 0, "worker pool needs at least one worker");

        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let shutdown = NotifyOnce::new();

        let workers = (0..num_workers)
            .map(|worker_idx| {
                let rx = rx.clone();
                let mut shutdown = shutdown.clone();
                LxTask::spawn(format!("{name}-worker-{worker_idx}"), async move {
                    loop {
                        let job = {
                            let mut rx_guard = rx.lock().await;
                            tokio::select! {
                                biased;
                                () = shutdown.recv() => None,
                                job = rx_guard.recv() => job,
                            }
                        };
                        match job {
                            Some(job) => job().await,
                            None => break,
                        }
                    }
                })
            })
            .collect();

        (Self { tx, shutdown }, workers)
    }

    /// Submit fire-and-forget work. Returns immediately with [`QueueFull`] if
    /// the bounded queue has no room; the caller should log-and-drop.
    pub fn submit<F>(&self, job: F) -> Result<(), QueueFull>
    where
        F: FnOnce() -> BoxFuture + Send + 'static,
    {
        self.tx.try_send(Box::new(job)).map_err(|_| QueueFull)
    }

    /// Convenience wrapper for submitting a plain `async` block.
    pub fn submit_fut<Fut>(&self, fut: Fut) -> Result<(), QueueFull>
    where
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.submit(move || Box::pin(fut))
    }

    /// Stop intake and signal workers to drain. Does not itself wait; combine
    /// with [`crate::task::try_join_tasks_and_shutdown`] using a
    /// `drain_deadline` shutdown timeout to bound how long outstanding jobs
    /// are given before being cancelled.
    pub fn close(&self) {
        debug!("Closing worker pool intake");
        self.shutdown.send();
    }
}

/// Helper used by callers that want a single bounded "drain, then cancel"
/// wait without wiring into the static-task shutdown join directly.
pub async fn drain_with_deadline(workers: Vec<LxTask<()>>, deadline: Duration) {
    let all = futures::future::join_all(workers.into_iter().map(|t| t.logged()));
    match tokio::time::timeout(deadline, all).await {
        Ok(_names) => debug!("Worker pool drained cleanly"),
        Err(_) => warn!("Worker pool did not drain within {deadline:?}, some jobs cancelled"),
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn submits_and_runs_jobs() {
        let (pool, workers) = WorkerPool::spawn("test", 2, 8);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = counter.clone();
            pool.submit_fut(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("queue has room");
        }

        // Give the workers a chance to drain the queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        pool.close();
        drain_with_deadline(workers, Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn full_queue_is_rejected_not_blocked() {
        let (pool, workers) = WorkerPool::spawn("test-full", 0.max(1), 1);
        // Fill the single-slot queue with a job that never completes until we
        // close the pool, to keep the worker busy.
        let gate = Arc::new(tokio::sync::Notify::new());
        let gate2 = gate.clone();
        pool.submit_fut(async move { gate2.notified().await })
            .expect("first job fits");

        // The worker immediately picks this up, freeing the queue slot, so
        // give it a moment before asserting on a *second* fill.
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.submit_fut(async move {}).expect("queue has room again");
        // A third job right behind it may or may not race the worker; the
        // key property under test is that submit() never blocks the caller.
        let _ = pool.submit_fut(async move {});

        gate.notify_one();
        pool.close();
        drain_with_deadline(workers, Duration::from_secs(1)).await;
    }
}
