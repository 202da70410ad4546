//! Bounded worker pool sharing the caller's memory

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::AbortHandle;

use super::{
    closed_error, lost_outcome, order_outcomes, BackendKind, ExecutionBackend, TaskHandle,
    TaskRunner,
};
use crate::error::Result;
use crate::transfer::{TransferOutcome, TransferTask};

/// Runs up to `workers` tasks at a time on the tokio runtime
pub struct BoundedPool {
    workers: usize,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    running: Mutex<Vec<AbortHandle>>,
}

impl BoundedPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            permits: Arc::new(Semaphore::new(workers)),
            closed: AtomicBool::new(false),
            running: Mutex::new(Vec::new()),
        }
    }

    fn track(&self, handle: AbortHandle) {
        if let Ok(mut running) = self.running.lock() {
            running.retain(|h| !h.is_finished());
            running.push(handle);
        }
    }
}

impl std::fmt::Debug for BoundedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedPool")
            .field("workers", &self.workers)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl ExecutionBackend for BoundedPool {
    fn kind(&self) -> BackendKind {
        BackendKind::Pool
    }

    fn workers(&self) -> usize {
        self.workers
    }

    async fn submit(&self, task: TransferTask, runner: Arc<dyn TaskRunner>) -> Result<TaskHandle> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error(self.kind()));
        }
        let index = task.index;
        let permits = Arc::clone(&self.permits);
        let handle = tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => runner.run(task).await,
                Err(_) => lost_outcome(index, "pool shut down"),
            }
        });
        self.track(handle.abort_handle());
        Ok(TaskHandle::spawned(index, handle))
    }

    async fn map(
        &self,
        tasks: Vec<TransferTask>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Vec<TransferOutcome>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error(self.kind()));
        }
        let total = tasks.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let indices: Vec<usize> = tasks.iter().map(|t| t.index).collect();

        let (task_tx, task_rx) = mpsc::channel::<(usize, TransferTask)>(total);
        for (position, task) in tasks.into_iter().enumerate() {
            // Capacity equals the task count, so this never waits.
            if task_tx.send((position, task)).await.is_err() {
                break;
            }
        }
        drop(task_tx);

        let task_rx = Arc::new(tokio::sync::Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, TransferOutcome)>();

        let worker_count = self.workers.min(total);
        tracing::debug!(workers = worker_count, tasks = total, "Starting pool workers");
        for worker_id in 0..worker_count {
            let task_rx = Arc::clone(&task_rx);
            let result_tx = result_tx.clone();
            let runner = Arc::clone(&runner);
            let permits = Arc::clone(&self.permits);
            let handle = tokio::spawn(async move {
                loop {
                    let next = task_rx.lock().await.recv().await;
                    let Some((position, task)) = next else {
                        break;
                    };
                    let Ok(_permit) = permits.acquire().await else {
                        break;
                    };
                    let outcome = runner.run(task).await;
                    if result_tx.send((position, outcome)).is_err() {
                        break;
                    }
                }
                tracing::trace!(worker_id, "Pool worker finished");
            });
            self.track(handle.abort_handle());
        }
        drop(result_tx);

        let mut collected = Vec::with_capacity(total);
        while let Some(entry) = result_rx.recv().await {
            collected.push(entry);
        }

        Ok(order_outcomes(total, &indices, collected))
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.permits.close();
        if let Ok(mut running) = self.running.lock() {
            for handle in running.drain(..) {
                handle.abort();
            }
        }
    }
}
