//! Execution backends
//!
//! Every backend offers the same contract (`submit`, `map`, `shutdown`) and
//! declares whether an authenticated session may be shared by its execution
//! units. In-process backends share one session; the distributed backend's
//! workers share nothing with the caller and must rebuild sessions from an
//! [`AuthContext`](crate::AuthContext) carried inside each task.

mod distributed;
mod pool;
mod sequential;

pub use distributed::Distributed;
pub use pool::BoundedPool;
pub use sequential::Sequential;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::transfer::{FailureKind, TransferError, TransferOutcome, TransferTask};

/// Whether one authenticated session may be shared by all execution units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAffinity {
    /// Units live in the caller's process and may share a session
    Shareable,
    /// Units are memory-isolated and need a serializable auth context
    NonShareable,
}

/// Backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sequential,
    Pool,
    Distributed,
}

impl BackendKind {
    pub const fn session_affinity(self) -> SessionAffinity {
        match self {
            BackendKind::Sequential | BackendKind::Pool => SessionAffinity::Shareable,
            // Separate processes never share memory, even on the same host.
            BackendKind::Distributed => SessionAffinity::NonShareable,
        }
    }

    /// Build a backend of this kind with `workers` execution units
    pub fn build(self, workers: usize) -> Arc<dyn ExecutionBackend> {
        match self {
            BackendKind::Sequential => Arc::new(Sequential::new()),
            BackendKind::Pool => Arc::new(BoundedPool::new(workers)),
            BackendKind::Distributed => Arc::new(Distributed::new(workers)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Sequential => "sequential",
            BackendKind::Pool => "pool",
            BackendKind::Distributed => "distributed",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "serial" => Ok(BackendKind::Sequential),
            "pool" | "threads" | "bounded" => Ok(BackendKind::Pool),
            "distributed" | "process" | "processes" => Ok(BackendKind::Distributed),
            other => Err(Error::Config(format!(
                "Unknown backend '{other}' (expected sequential, pool or distributed)"
            ))),
        }
    }
}

/// The work function handed to a backend
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run one task to completion; failures are reported inside the outcome
    async fn run(&self, task: TransferTask) -> TransferOutcome;
}

/// Handle to a submitted task
pub struct TaskHandle {
    index: usize,
    inner: HandleInner,
}

enum HandleInner {
    Ready(TransferOutcome),
    Spawned(JoinHandle<TransferOutcome>),
}

impl TaskHandle {
    pub(crate) fn ready(outcome: TransferOutcome) -> Self {
        Self {
            index: outcome.index,
            inner: HandleInner::Ready(outcome),
        }
    }

    pub(crate) fn spawned(index: usize, handle: JoinHandle<TransferOutcome>) -> Self {
        Self {
            index,
            inner: HandleInner::Spawned(handle),
        }
    }

    /// Index of the submitted task
    pub fn index(&self) -> usize {
        self.index
    }

    /// Wait for the outcome; a crashed or aborted unit becomes a failed outcome
    pub async fn join(self) -> TransferOutcome {
        match self.inner {
            HandleInner::Ready(outcome) => outcome,
            HandleInner::Spawned(handle) => match handle.await {
                Ok(outcome) => outcome,
                Err(e) => lost_outcome(self.index, &e.to_string()),
            },
        }
    }

    /// Best-effort cancellation
    pub fn abort(&self) {
        if let HandleInner::Spawned(handle) = &self.inner {
            handle.abort();
        }
    }
}

/// Uniform contract implemented by every backend
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn session_affinity(&self) -> SessionAffinity {
        self.kind().session_affinity()
    }

    /// Number of concurrent execution units
    fn workers(&self) -> usize;

    /// Start one task
    async fn submit(&self, task: TransferTask, runner: Arc<dyn TaskRunner>) -> Result<TaskHandle>;

    /// Run all tasks; outcomes are returned in the order of `tasks`
    async fn map(
        &self,
        tasks: Vec<TransferTask>,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Vec<TransferOutcome>>;

    /// Stop accepting work and abort anything still running
    async fn shutdown(&self);
}

pub(crate) fn lost_outcome(index: usize, reason: &str) -> TransferOutcome {
    TransferOutcome::failure(
        index,
        TransferError::new(
            FailureKind::Permanent,
            format!("execution unit lost: {reason}"),
        ),
        0,
    )
}

pub(crate) fn closed_error(kind: BackendKind) -> Error {
    Error::General(format!("{kind} backend has been shut down"))
}

/// Put outcomes back into task order; missing slots become failures
pub(crate) fn order_outcomes(
    positions: usize,
    task_indices: &[usize],
    collected: Vec<(usize, TransferOutcome)>,
) -> Vec<TransferOutcome> {
    let mut slots: Vec<Option<TransferOutcome>> = vec![None; positions];
    for (position, outcome) in collected {
        if let Some(slot) = slots.get_mut(position) {
            *slot = Some(outcome);
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(position, slot)| {
            slot.unwrap_or_else(|| lost_outcome(task_indices[position], "no result reported"))
        })
        .collect()
}
