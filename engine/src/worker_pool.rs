//! Named, bounded worker pools.
//!
//! Each engine subsystem owns one pool: a FIFO of tasks serviced under a
//! concurrency bound, with per-key serialization so work on the same entity
//! never overlaps. Tasks close over IDs, never raw pointers, so a late task
//! referencing an evicted entity resolves as a no-op against the ID store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// A bounded worker pool with per-key serialization.
pub struct WorkerPool {
    name: String,
    key_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, max_concurrent: usize) -> Self {
        Self {
            name: name.into(),
            key_locks: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `task` under the concurrency bound, serialized per `key`.
    /// Returns `None` if the pool is shutting down.
    pub async fn submit<F, R>(&self, key: &str, task: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return None;
        }
        let _permit = self.semaphore.acquire().await.ok()?;
        let lock = self.key_lock(key).await;
        let _key_guard = lock.lock().await;

        if self.shutdown.load(Ordering::Acquire) {
            return None;
        }
        tokio::task::spawn_blocking(task).await.ok()
    }

    /// Cooperative shutdown: queued tasks drain as no-ops.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.semaphore.close();
    }

    /// Drop key locks no longer held by in-flight tasks.
    pub async fn cleanup(&self) {
        let mut locks = self.key_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// The engine's per-subsystem pools.
pub struct WorkerPools {
    pub booker: WorkerPool,
    pub mempool: WorkerPool,
    pub accounts: WorkerPool,
    pub commitments: WorkerPool,
}

impl WorkerPools {
    pub fn new(workers_per_pool: usize) -> Self {
        Self {
            booker: WorkerPool::new("booker", workers_per_pool),
            mempool: WorkerPool::new("mempool", workers_per_pool),
            accounts: WorkerPool::new("accounts", workers_per_pool),
            // Commit is strictly serial per engine.
            commitments: WorkerPool::new("commitments", 1),
        }
    }

    pub fn shutdown(&self) {
        self.booker.shutdown();
        self.mempool.shutdown();
        self.accounts.shutdown();
        self.commitments.shutdown();
    }
}
