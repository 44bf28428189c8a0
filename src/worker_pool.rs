//! The bounded worker pool backing sync-mode parallel execution.
//!
//! Tokio's blocking thread pool isn't sized per call, so "at most N workers"
//! is enforced with a semaphore gating `spawn_blocking` dispatch instead.
//! Handles are collected in submission order and awaited sequentially so
//! join order is always FIFO, regardless of which child finishes first.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::OpError;

#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Run `jobs` (closures that each do blocking work and return
    /// `Result<(), OpError>`), capped at this pool's worker count, and
    /// return their results in submission order.
    pub async fn run_all<F>(&self, jobs: Vec<F>) -> Result<Vec<Result<(), OpError>>, OpError>
    where
        F: FnOnce() -> Result<(), OpError> + Send + 'static,
    {
        let mut handles: Vec<JoinHandle<Result<(), OpError>>> = Vec::with_capacity(jobs.len());
        for job in jobs {
            // Acquired here (on the async side) and moved into the blocking
            // task so at most `max_workers` blocking jobs run at once; the
            // permit is released when the task finishes.
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore never closed");
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    return Err(OpError::Join {
                        task: "worker_pool".to_string(),
                        source: Box::new(join_error),
                    })
                }
            }
        }
        Ok(results)
    }

    /// Offload a single blocking job, e.g. an async flow driving a sync
    /// operation tree.
    pub async fn run_one<F>(&self, job: F) -> Result<(), OpError>
    where
        F: FnOnce() -> Result<(), OpError> + Send + 'static,
    {
        self.run_all(vec![job]).await?.pop().expect("exactly one job submitted")
    }

    /// Acquire a worker slot and dispatch `job` onto it, returning its
    /// handle without waiting for completion. The slot is held until the
    /// job finishes; acquiring it is itself what bounds concurrency to this
    /// pool's worker count for callers that submit one job at a time (e.g.
    /// a sync `ParallelOp` fanning children out while honoring the cap).
    pub async fn spawn_task<F, T>(&self, job: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
    }
}
