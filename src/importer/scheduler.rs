//! Bounded execution of work units.
//!
//! A [`WorkerPool`] is shared by every importer of a run and caps how many
//! units execute and how many may wait. Each importer owns a [`Scheduler`]
//! that tracks its own outstanding units and reports their outcomes.

use crate::error::IndexError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{error, warn};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub const DEFAULT_QUEUE_FACTOR: usize = 10;

pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;
pub type FailureCallback = Arc<dyn Fn(&IndexError) + Send + Sync>;

/// Fixed-size pool of workers with a bounded waiting queue.
#[derive(Debug)]
pub struct WorkerPool {
    execution: Arc<Semaphore>,
    admission: Arc<Semaphore>,
    size: usize,
    capacity: usize,
}

impl WorkerPool {
    /// `size` units run at once; `size * queue_factor` more may wait.
    pub fn new(size: usize, queue_factor: usize) -> Self {
        let size = size.max(1);
        let capacity = size.saturating_mul(queue_factor.saturating_add(1));
        Self {
            execution: Arc::new(Semaphore::new(size)),
            admission: Arc::new(Semaphore::new(capacity)),
            size,
            capacity,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Running plus queued units the pool admits before `submit` blocks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.admission.available_permits()
    }

    /// Stop admitting work. Units already admitted still run.
    pub fn close(&self) {
        self.admission.close();
    }
}

/// Tracks one importer's units on a shared pool.
pub struct Scheduler {
    pool: Arc<WorkerPool>,
    outstanding: Arc<DashMap<u64, JoinHandle<()>>>,
    next_id: AtomicU64,
    failed: Arc<AtomicUsize>,
    on_progress: RwLock<Option<ProgressCallback>>,
    on_failure: RwLock<Option<FailureCallback>>,
}

impl Scheduler {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            outstanding: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            failed: Arc::new(AtomicUsize::new(0)),
            on_progress: RwLock::new(None),
            on_failure: RwLock::new(None),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Called with `(indexed, deleted)` after every successful unit.
    pub fn on_progress<F>(&self, callback: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        *self.on_progress.write() = Some(Arc::new(callback));
    }

    /// Called with the error of every failed unit.
    pub fn on_failure<F>(&self, callback: F)
    where
        F: Fn(&IndexError) + Send + Sync + 'static,
    {
        *self.on_failure.write() = Some(Arc::new(callback));
    }

    /// Queue `transform(input)` on the pool.
    ///
    /// Waits while the pool is saturated. Callbacks registered at this point
    /// receive the unit's outcome.
    pub async fn submit<I, F, Fut>(&self, input: I, transform: F)
    where
        I: Send + 'static,
        F: FnOnce(I) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(usize, usize), IndexError>> + Send + 'static,
    {
        let admission = Arc::clone(&self.pool.admission).acquire_owned().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let outstanding = Arc::clone(&self.outstanding);
        let execution = Arc::clone(&self.pool.execution);
        let failed = Arc::clone(&self.failed);
        let on_progress = self.on_progress.read().clone();
        let on_failure = self.on_failure.read().clone();

        let unit = async move {
            let result = match admission {
                Ok(_admitted) => match execution.acquire_owned().await {
                    Ok(_running) => match tokio::spawn(transform(input)).await {
                        Ok(result) => result,
                        Err(_) => Err(IndexError::WorkUnitPanicked),
                    },
                    Err(_) => Err(IndexError::PoolClosed),
                },
                Err(_) => Err(IndexError::PoolClosed),
            };

            match result {
                Ok((indexed, deleted)) => {
                    if let Some(callback) = on_progress {
                        callback(indexed, deleted);
                    }
                }
                Err(err) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    match on_failure {
                        Some(callback) => callback(&err),
                        None => error!("work unit {} failed: {}", id, err),
                    }
                }
            }

            outstanding.remove(&id);
        };

        // Spawn while holding the entry so the unit cannot remove itself
        // before it is registered.
        match self.outstanding.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(tokio::spawn(unit));
            }
            Entry::Occupied(_) => {
                warn!("work unit id {} reused; running untracked", id);
                tokio::spawn(unit);
            }
        }
    }

    /// Wait for every unit submitted before this call.
    pub async fn wait_all(&self) {
        let ids: Vec<u64> = self.outstanding.iter().map(|entry| *entry.key()).collect();

        for id in ids {
            let Some((_, handle)) = self.outstanding.remove(&id) else {
                continue;
            };
            if let Err(err) = handle.await {
                error!("work unit {} aborted while reporting: {}", id, err);
            }
        }
    }

    /// Units submitted and not yet resolved.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Units that failed since this scheduler was created.
    pub fn failures(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn counting(scheduler: &Scheduler) -> (Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let progress = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&progress);
        scheduler.on_progress(move |indexed, _| {
            seen.fetch_add(indexed, Ordering::SeqCst);
        });

        let errors = Arc::clone(&failures);
        scheduler.on_failure(move |err| {
            errors.lock().push(err.to_string());
        });

        (progress, failures)
    }

    #[tokio::test]
    async fn reports_progress_of_every_unit() {
        let scheduler = Scheduler::new(Arc::new(WorkerPool::new(4, 2)));
        let (progress, failures) = counting(&scheduler);

        for n in 1..=5usize {
            scheduler.submit(n, |n| async move { Ok((n, 0)) }).await;
        }
        scheduler.wait_all().await;

        assert_eq!(progress.load(Ordering::SeqCst), 15);
        assert!(failures.lock().is_empty());
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_runs_more_than_pool_size() {
        let scheduler = Scheduler::new(Arc::new(WorkerPool::new(2, 10)));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..12 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            scheduler
                .submit((), move |_| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok((1, 0))
                })
                .await;
        }
        scheduler.wait_all().await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn submit_blocks_while_saturated() {
        let pool = Arc::new(WorkerPool::new(1, 1));
        assert_eq!(pool.capacity(), 2);
        let scheduler = Scheduler::new(Arc::clone(&pool));
        let (progress, _) = counting(&scheduler);
        let gate = Arc::new(Semaphore::new(0));

        for _ in 0..2 {
            let gate = Arc::clone(&gate);
            scheduler
                .submit((), move |_| async move {
                    let _pass = gate.acquire().await.expect("gate open");
                    Ok((1, 0))
                })
                .await;
        }
        assert_eq!(pool.available(), 0);

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            scheduler.submit((), |_| async { Ok((1, 0)) }),
        )
        .await;
        assert!(blocked.is_err(), "third unit must wait for admission");

        gate.add_permits(2);
        scheduler.submit((), |_| async { Ok((1, 0)) }).await;
        scheduler.wait_all().await;

        assert_eq!(progress.load(Ordering::SeqCst), 3);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn failures_do_not_affect_siblings() {
        let scheduler = Scheduler::new(Arc::new(WorkerPool::new(2, 10)));
        let (progress, failures) = counting(&scheduler);

        scheduler.submit((), |_| async { Ok((1, 0)) }).await;
        scheduler
            .submit((), |_| async {
                Err(IndexError::Config("broken page".into()))
            })
            .await;
        scheduler
            .submit((), |_| async {
                if true {
                    panic!("transform blew up");
                }
                Ok((1, 0))
            })
            .await;
        scheduler.submit((), |_| async { Ok((0, 2)) }).await;
        scheduler.submit((), |_| async { Ok((1, 0)) }).await;
        scheduler.wait_all().await;

        assert_eq!(progress.load(Ordering::SeqCst), 2);
        let failures = failures.lock();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().any(|f| f.contains("broken page")));
        assert!(failures.iter().any(|f| f == "work unit panicked"));
        assert_eq!(scheduler.failures(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn wait_all_is_a_barrier() {
        let scheduler = Scheduler::new(Arc::new(WorkerPool::new(3, 1)));
        let (progress, _) = counting(&scheduler);

        for n in 0..20u64 {
            scheduler
                .submit(n, |n| async move {
                    tokio::time::sleep(Duration::from_millis(n % 5)).await;
                    Ok((1, 0))
                })
                .await;
        }
        scheduler.wait_all().await;

        assert_eq!(progress.load(Ordering::SeqCst), 20);
        assert_eq!(scheduler.outstanding(), 0);
    }

    #[tokio::test]
    async fn closed_pool_rejects_units() {
        let pool = Arc::new(WorkerPool::new(1, 0));
        let scheduler = Scheduler::new(Arc::clone(&pool));
        let (progress, failures) = counting(&scheduler);

        pool.close();
        scheduler.submit((), |_| async { Ok((1, 0)) }).await;
        scheduler.wait_all().await;

        assert_eq!(progress.load(Ordering::SeqCst), 0);
        assert_eq!(*failures.lock(), vec!["worker pool is closed".to_string()]);
    }
}
