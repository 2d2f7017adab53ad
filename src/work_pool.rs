//! Consumer work pool.
//!
//! Application callbacks never run on the connection driver. The driver
//! submits them as jobs to a per-channel [`WorkQueue`]; the pool drains each
//! queue on a spawned task, one job at a time and in submission order, while
//! different channels drain concurrently up to the pool size.

use std::{
    collections::VecDeque,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};
use tokio::sync::Semaphore;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::panic::{format_panic, lock};

/// A unit of work: produces the future that runs one callback.
pub type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Jobs a drainer runs before yielding its permit to other channels.
const MAX_BATCH: usize = 16;

/// FIFO of jobs for one channel.
#[derive(Default)]
pub struct WorkQueue {
    jobs: Mutex<VecDeque<Job>>,
    running: AtomicBool,
    drained: CancellationToken,
}

impl WorkQueue {
    /// Token cancelled once the queue's final job has run.
    #[must_use]
    pub fn drained(&self) -> CancellationToken { self.drained.clone() }

    /// Jobs waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize { lock(&self.jobs).len() }

    fn take_batch(&self) -> Vec<Job> {
        let mut jobs = lock(&self.jobs);
        let count = jobs.len().min(MAX_BATCH);
        jobs.drain(..count).collect()
    }
}

struct PoolInner {
    queues: DashMap<u16, Arc<WorkQueue>>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    stopped: AtomicBool,
}

/// Bounded pool of drainer tasks shared by a connection's channels.
///
/// Clones share the pool.
#[derive(Clone)]
pub struct WorkPool(Arc<PoolInner>);

impl WorkPool {
    /// Create a pool running at most `size` callbacks at once.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self(Arc::new(PoolInner {
            queues: DashMap::new(),
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(size.max(1))),
            stopped: AtomicBool::new(false),
        }))
    }

    /// Create and register the queue for `channel`, replacing any queue a
    /// previous channel with the same number left behind.
    #[must_use]
    pub fn register(&self, channel: u16) -> Arc<WorkQueue> {
        let queue = Arc::new(WorkQueue::default());
        self.0.queues.insert(channel, queue.clone());
        queue
    }

    /// Remove `queue` from the registry if it is still the one registered for
    /// `channel`.
    pub fn unregister(&self, channel: u16, queue: &Arc<WorkQueue>) {
        self.0
            .queues
            .remove_if(&channel, |_, registered| Arc::ptr_eq(registered, queue));
    }

    /// Number of registered queues.
    #[must_use]
    pub fn queue_count(&self) -> usize { self.0.queues.len() }

    /// Append a job to `queue`, starting a drainer if none is running.
    ///
    /// Jobs submitted after [`WorkPool::shutdown`] are dropped.
    pub fn submit(&self, queue: &Arc<WorkQueue>, job: Job) {
        if self.0.stopped.load(Ordering::Acquire) {
            tracing::debug!("work pool stopped; dropping job");
            return;
        }
        lock(&queue.jobs).push_back(job);
        if !queue.running.swap(true, Ordering::AcqRel) {
            let queue = queue.clone();
            let permits = self.0.permits.clone();
            self.0.tracker.spawn(drain(queue, permits));
        }
    }

    /// Append the last job for `queue`; its drained token is cancelled after
    /// the job has run.
    pub fn submit_final(&self, queue: &Arc<WorkQueue>, job: Job) {
        let drained = queue.drained.clone();
        if self.0.stopped.load(Ordering::Acquire) {
            drained.cancel();
            return;
        }
        self.submit(
            queue,
            Box::new(move || {
                async move {
                    job().await;
                    drained.cancel();
                }
                .boxed()
            }),
        );
    }

    /// Stop accepting jobs and wait up to `grace` for running drainers.
    ///
    /// Returns `true` if every drainer finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.0.stopped.store(true, Ordering::Release);
        self.0.queues.clear();
        self.0.tracker.close();
        tokio::time::timeout(grace, self.0.tracker.wait())
            .await
            .is_ok()
    }
}

async fn drain(queue: Arc<WorkQueue>, permits: Arc<Semaphore>) {
    loop {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            return;
        };
        let batch = queue.take_batch();
        if batch.is_empty() {
            drop(permit);
            queue.running.store(false, Ordering::Release);
            // A submitter that saw `running` still set relies on this
            // re-check to get its job drained.
            if lock(&queue.jobs).is_empty() || queue.running.swap(true, Ordering::AcqRel) {
                return;
            }
            continue;
        }
        for job in batch {
            if let Err(panic) = AssertUnwindSafe(job()).catch_unwind().await {
                tracing::error!(panic = %format_panic(panic), "work pool job panicked");
            }
        }
        drop(permit);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn pool() -> WorkPool { WorkPool::new(2) }

    fn recording_job(log: &Arc<Mutex<Vec<usize>>>, value: usize) -> Job {
        let log = log.clone();
        Box::new(move || {
            async move {
                tokio::task::yield_now().await;
                lock(&log).push(value);
            }
            .boxed()
        })
    }

    #[rstest]
    #[tokio::test]
    async fn jobs_run_in_submission_order(pool: WorkPool) {
        let queue = pool.register(1);
        let log = Arc::new(Mutex::new(Vec::new()));
        for value in 0..100 {
            pool.submit(&queue, recording_job(&log, value));
        }
        let drained = queue.drained();
        pool.submit_final(&queue, Box::new(|| async {}.boxed()));
        drained.cancelled().await;
        assert_eq!(*lock(&log), (0..100).collect::<Vec<_>>());
    }

    #[rstest]
    #[tokio::test]
    async fn one_queue_never_runs_jobs_concurrently(pool: WorkPool) {
        let queue = pool.register(1);
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));
        for _ in 0..20 {
            let active = active.clone();
            let overlap = overlap.clone();
            pool.submit(
                &queue,
                Box::new(move || {
                    async move {
                        if active.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlap.store(true, Ordering::SeqCst);
                        }
                        tokio::task::yield_now().await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    }
                    .boxed()
                }),
            );
        }
        let drained = queue.drained();
        pool.submit_final(&queue, Box::new(|| async {}.boxed()));
        drained.cancelled().await;
        assert!(!overlap.load(Ordering::SeqCst));
    }

    #[rstest]
    #[tokio::test]
    async fn unregister_checks_identity(pool: WorkPool) {
        let old = pool.register(3);
        let _new = pool.register(3);
        pool.unregister(3, &old);
        assert_eq!(pool.queue_count(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn jobs_after_shutdown_are_dropped(pool: WorkPool) {
        let queue = pool.register(1);
        assert!(pool.shutdown(Duration::from_secs(1)).await);
        let log = Arc::new(Mutex::new(Vec::new()));
        pool.submit(&queue, recording_job(&log, 1));
        tokio::task::yield_now().await;
        assert!(lock(&log).is_empty());
        assert_eq!(queue.pending(), 0);
    }
}
