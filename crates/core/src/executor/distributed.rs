//! Memory-isolated workers
//!
//! Workers receive each task as an encoded frame and report the outcome the
//! same way; nothing but bytes crosses the boundary. A session built by the
//! caller can therefore never reach a worker, and tasks that need
//! authentication must carry an [`AuthContext`](crate::AuthContext).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::{
    closed_error, lost_outcome, order_outcomes, BackendKind, ExecutionBackend, TaskHandle,
    TaskRunner,
};
use crate::error::Result;
use crate::transfer::{TransferOutcome, TransferTask};

/// Encoded task or outcome
type Frame = Vec<u8>;

/// Round-robin scheduler over isolated workers
pub struct Distributed {
    workers: usize,
    closed: AtomicBool,
    running: Mutex<Vec<AbortHandle>>,
}

impl Distributed {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
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

impl std::fmt::Debug for Distributed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributed")
            .field("workers", &self.workers)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

fn encode_task(task: &TransferTask) -> std::result::Result<Frame, String> {
    serde_json::to_vec(task).map_err(|e| format!("task could not be encoded: {e}"))
}

fn decode_outcome(index: usize, frame: &[u8]) -> TransferOutcome {
    match serde_json::from_slice(frame) {
        Ok(outcome) => outcome,
        Err(e) => lost_outcome(index, &format!("outcome could not be decoded: {e}")),
    }
}

/// Worker side: decode, run and encode
async fn execute_frame(runner: &dyn TaskRunner, index: usize, frame: &[u8]) -> Frame {
    let outcome = match serde_json::from_slice::<TransferTask>(frame) {
        Ok(task) => runner.run(task).await,
        Err(e) => lost_outcome(index, &format!("task could not be decoded: {e}")),
    };
    serde_json::to_vec(&outcome).unwrap_or_default()
}

#[async_trait]
impl ExecutionBackend for Distributed {
    fn kind(&self) -> BackendKind {
        BackendKind::Distributed
    }

    fn workers(&self) -> usize {
        self.workers
    }

    async fn submit(&self, task: TransferTask, runner: Arc<dyn TaskRunner>) -> Result<TaskHandle> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error(self.kind()));
        }
        let index = task.index;
        let frame = match encode_task(&task) {
            Ok(frame) => frame,
            Err(reason) => return Ok(TaskHandle::ready(lost_outcome(index, &reason))),
        };
        drop(task);

        let handle = tokio::spawn(async move {
            let reply = execute_frame(runner.as_ref(), index, &frame).await;
            decode_outcome(index, &reply)
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
        let worker_count = self.workers.min(total);

        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<(usize, Frame)>();
        let mut inboxes = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let (inbox_tx, mut inbox_rx) = mpsc::unbounded_channel::<(usize, usize, Frame)>();
            let reply_tx = reply_tx.clone();
            let runner = Arc::clone(&runner);
            let handle = tokio::spawn(async move {
                while let Some((position, index, frame)) = inbox_rx.recv().await {
                    let reply = execute_frame(runner.as_ref(), index, &frame).await;
                    if reply_tx.send((position, reply)).is_err() {
                        break;
                    }
                }
                tracing::trace!(worker_id, "Distributed worker drained");
            });
            self.track(handle.abort_handle());
            inboxes.push(inbox_tx);
        }
        drop(reply_tx);

        let mut collected = Vec::with_capacity(total);
        for (position, task) in tasks.into_iter().enumerate() {
            let frame = match encode_task(&task) {
                Ok(frame) => frame,
                Err(reason) => {
                    collected.push((position, lost_outcome(task.index, &reason)));
                    continue;
                }
            };
            let inbox = &inboxes[position % worker_count];
            if inbox.send((position, task.index, frame)).is_err() {
                collected.push((position, lost_outcome(task.index, "worker unavailable")));
            }
        }
        drop(inboxes);

        while let Some((position, reply)) = reply_rx.recv().await {
            collected.push((position, decode_outcome(indices[position], &reply)));
        }

        Ok(order_outcomes(total, &indices, collected))
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut running) = self.running.lock() {
            for handle in running.drain(..) {
                handle.abort();
            }
        }
    }
}
