//! Bounded worker pool
//!
//! A counting semaphore caps how many submitted futures run at once. Each
//! spawned task owns its permit and releases it on completion, which wakes
//! exactly one waiting `submit`.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<()>,
    max_parallel: usize,
}

impl WorkerPool {
    /// Create a pool running at most `max_parallel` tasks (at least 1)
    pub fn new(max_parallel: usize) -> Self {
        let max_parallel = max_parallel.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_parallel)),
            tasks: JoinSet::new(),
            max_parallel,
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Tasks currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.max_parallel - self.semaphore.available_permits()
    }

    /// Start `work` once a slot is free. Waits only while the pool is full.
    pub async fn submit<F>(&mut self, work: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .context("Worker pool semaphore closed")?;

        self.tasks.spawn(async move {
            let _permit = permit;
            work.await;
        });

        Ok(())
    }

    /// Wait for every submitted task. Returns how many panicked.
    pub async fn join(mut self) -> usize {
        debug!("Waiting for {} worker tasks", self.tasks.len());

        let mut panicked = 0;
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!("Worker task failed: {}", e);
                panicked += 1;
            }
        }
        panicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_never_exceeds_max_parallel() {
        let mut pool = WorkerPool::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..12 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            pool.submit(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
            assert!(pool.in_flight() <= 3);
        }

        assert_eq!(pool.join().await, 0);
        assert_eq!(done.load(Ordering::SeqCst), 12);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_is_clamped_to_one() {
        let mut pool = WorkerPool::new(0);
        assert_eq!(pool.max_parallel(), 1);

        pool.submit(async {}).await.unwrap();
        pool.submit(async {}).await.unwrap();
        assert_eq!(pool.join().await, 0);
    }

    #[tokio::test]
    async fn test_join_reports_panics() {
        let mut pool = WorkerPool::new(2);
        pool.submit(async { panic!("boom") }).await.unwrap();
        pool.submit(async {}).await.unwrap();

        assert_eq!(pool.join().await, 1);
    }

    #[tokio::test]
    async fn test_in_flight_released_after_completion() {
        let mut pool = WorkerPool::new(2);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        pool.submit(async move {
            let _ = rx.await;
        })
        .await
        .unwrap();
        assert_eq!(pool.in_flight(), 1);

        tx.send(()).unwrap();
        assert_eq!(pool.join().await, 0);
    }
}
