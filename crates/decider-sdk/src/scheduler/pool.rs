// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use tracing::error;

use crate::error::{EngineError, Result};

/// Bounded allocator of OS threads for workflow threads.
///
/// Shared by all executions of a worker. Running out of threads means the
/// worker is under-provisioned; it is an engine error, never a workflow
/// failure.
#[derive(Debug, Clone)]
pub struct WorkflowThreadPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
struct PoolInner {
    max_threads: usize,
    active: AtomicUsize,
}

/// Releases a pool slot when the OS thread exits.
struct SlotGuard(Arc<PoolInner>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkflowThreadPool {
    pub fn new(max_threads: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_threads,
                active: AtomicUsize::new(0),
            }),
        }
    }

    pub fn max_threads(&self) -> usize {
        self.inner.max_threads
    }

    pub fn active_threads(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn spawn<F>(&self, name: String, f: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let max_threads = self.inner.max_threads;
        self.inner
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < max_threads).then_some(active + 1)
            })
            .map_err(|_| {
                error!(max_threads, "Workflow thread pool exhausted");
                EngineError::ThreadPoolExhausted { max_threads }
            })?;

        let guard = SlotGuard(Arc::clone(&self.inner));
        std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let _guard = guard;
                f();
            })
            .map_err(|e| EngineError::ThreadSpawn(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_exhausted_pool_rejects_spawn() {
        let pool = WorkflowThreadPool::new(1);
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let first = pool
            .spawn("first".to_string(), move || {
                let _ = release_rx.recv();
            })
            .unwrap();
        assert_eq!(pool.active_threads(), 1);

        let err = pool.spawn("second".to_string(), || {}).unwrap_err();
        assert_eq!(err, EngineError::ThreadPoolExhausted { max_threads: 1 });

        release_tx.send(()).unwrap();
        first.join().unwrap();
        assert_eq!(pool.active_threads(), 0);
        pool.spawn("third".to_string(), || {})
            .unwrap()
            .join()
            .unwrap();
    }
}
