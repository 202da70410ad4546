//! Inline execution on the caller's task

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{closed_error, BackendKind, ExecutionBackend, TaskHandle, TaskRunner};
use crate::error::Result;
use crate::transfer::{TransferOutcome, TransferTask};

/// Runs every task inline, one after another
#[derive(Debug, Default)]
pub struct Sequential {
    closed: AtomicBool,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionBackend for Sequential {
    fn kind(&self) -> BackendKind {
        BackendKind::Sequential
    }

    fn workers(&self) -> usize {
        1
    }

    async fn submit(&self, task: TransferTask, runner: Arc<dyn TaskRunner>) -> Result<TaskHandle> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error(self.kind()));
        }
        Ok(TaskHandle::ready(runner.run(task).await))
    }

    async fn map(
        &self,
        tasks: Vec<TransferTask>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Vec<TransferOutcome>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(closed_error(self.kind()));
        }
        let mut outcomes = Vec::with_capacity(tasks.len());
        for task in tasks {
            outcomes.push(runner.run(task).await);
        }
        Ok(outcomes)
    }

    async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
