//! Transfer tasks, outcomes and options
//!
//! Everything that travels between the orchestrator and an execution worker
//! is plain serializable data, so the same task description works for
//! in-process pools and for memory-isolated workers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::config::{RetryConfig, TransferConfig};
use crate::error::Error;
use crate::object::RemoteObject;
use crate::resolver::AccessMethod;

/// Per-item failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retryable network failure that exhausted its attempts
    Transient,
    /// Not found, forbidden or otherwise not worth retrying
    Permanent,
    /// The worker could not rebuild a session from its auth context
    Rehydration,
    /// The item ran past its time budget
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
            FailureKind::Rehydration => "rehydration",
            FailureKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Serializable per-item error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} failure: {message}")]
pub struct TransferError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransferError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&Error> for TransferError {
    fn from(error: &Error) -> Self {
        let kind = match error {
            Error::Rehydration(_) => FailureKind::Rehydration,
            Error::Timeout(_) => FailureKind::Timeout,
            e if e.is_retryable() => FailureKind::Transient,
            _ => FailureKind::Permanent,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<Error> for TransferError {
    fn from(error: Error) -> Self {
        Self::from(&error)
    }
}

/// What to do with each object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransferOp {
    /// Write each object into `target_dir`
    Download { target_dir: PathBuf, overwrite: bool },
    /// Check each object is readable and return a stream descriptor
    Open,
}

/// One unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferTask {
    /// Position in the batch
    pub index: usize,
    pub object: RemoteObject,
    pub method: AccessMethod,
    pub op: TransferOp,
    pub retry: RetryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_item_timeout_ms: Option<u64>,
    /// Batch deadline; work past it is abandoned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Timestamp>,
    /// Present when the worker must build its own session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthContext>,
}

impl TransferTask {
    /// Final path for a download, if the op is a download and the object has a file name
    pub fn target_path(&self) -> Option<PathBuf> {
        match &self.op {
            TransferOp::Download { target_dir, .. } => {
                self.object.file_name().map(|name| target_dir.join(name))
            }
            TransferOp::Open => None,
        }
    }
}

/// Descriptor of a readable remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedObject {
    pub url: String,
    pub method: AccessMethod,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

/// Successful product of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferOutput {
    File {
        path: PathBuf,
        bytes: u64,
        /// The file already existed and no transfer happened
        skipped: bool,
    },
    Stream(OpenedObject),
}

/// Result of running one task, as reported by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TransferOutput>,
    /// Transport attempts made for this item
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransferError>,
}

impl TransferOutcome {
    pub fn success(index: usize, output: TransferOutput, attempts: u32) -> Self {
        Self {
            index,
            output: Some(output),
            attempts,
            error: None,
        }
    }

    pub fn failure(index: usize, error: TransferError, attempts: u32) -> Self {
        Self {
            index,
            output: None,
            attempts,
            error: Some(error),
        }
    }
}

/// One entry of a batch result, in input order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub object: RemoteObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<TransferOutput>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransferError>,
}

impl TransferResult {
    pub fn from_outcome(object: RemoteObject, outcome: TransferOutcome) -> Self {
        Self {
            object,
            output: outcome.output,
            attempts: outcome.attempts,
            error: outcome.error,
        }
    }

    /// A result for an item that never reached a worker
    pub fn failed(object: RemoteObject, error: TransferError) -> Self {
        Self {
            object,
            output: None,
            attempts: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn local_path(&self) -> Option<&Path> {
        match &self.output {
            Some(TransferOutput::File { path, .. }) => Some(path),
            _ => None,
        }
    }

    pub fn opened(&self) -> Option<&OpenedObject> {
        match &self.output {
            Some(TransferOutput::Stream(opened)) => Some(opened),
            _ => None,
        }
    }
}

/// Callback for per-item completion, used to drive progress displays.
///
/// `on_item` runs on whichever worker finished the item.
pub trait ProgressObserver: Send + Sync {
    fn on_start(&self, _total: usize) {}
    fn on_item(&self, outcome: &TransferOutcome);
    fn on_finish(&self) {}
}

/// Batch options
#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub retry: RetryConfig,
    /// Time budget per attempt
    pub per_item_timeout: Option<Duration>,
    /// Time budget for the whole batch
    pub batch_timeout: Option<Duration>,
    pub show_progress: bool,
    /// Re-download files that already exist locally
    pub overwrite_existing: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            per_item_timeout: None,
            batch_timeout: None,
            show_progress: false,
            overwrite_existing: false,
        }
    }
}

impl From<&TransferConfig> for TransferOptions {
    fn from(config: &TransferConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            per_item_timeout: config.per_item_timeout_ms.map(Duration::from_millis),
            batch_timeout: config.batch_timeout_ms.map(Duration::from_millis),
            show_progress: false,
            overwrite_existing: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let e = TransferError::from(Error::Network("reset".into()));
        assert_eq!(e.kind, FailureKind::Transient);
        let e = TransferError::from(Error::NotFound("x".into()));
        assert_eq!(e.kind, FailureKind::Permanent);
        let e = TransferError::from(Error::Rehydration("expired".into()));
        assert_eq!(e.kind, FailureKind::Rehydration);
        let e = TransferError::from(Error::Timeout("deadline".into()));
        assert_eq!(e.kind, FailureKind::Timeout);
        assert_eq!(e.to_string(), "timeout failure: Timed out: deadline");
    }

    #[test]
    fn test_target_path() {
        let task = TransferTask {
            index: 0,
            object: RemoteObject::from_url("https://host/dir/granule.nc", None).unwrap(),
            method: AccessMethod::External,
            op: TransferOp::Download {
                target_dir: PathBuf::from("/data"),
                overwrite: false,
            },
            retry: RetryConfig::default(),
            per_item_timeout_ms: None,
            deadline: None,
            auth: None,
        };
        assert_eq!(task.target_path(), Some(PathBuf::from("/data/granule.nc")));

        let open = TransferTask {
            op: TransferOp::Open,
            ..task
        };
        assert!(open.target_path().is_none());
    }

    #[test]
    fn test_task_survives_serialization() {
        let task = TransferTask {
            index: 3,
            object: RemoteObject::from_url("s3://bucket/key.nc", Some("POCLOUD")).unwrap(),
            method: AccessMethod::Direct,
            op: TransferOp::Open,
            retry: RetryConfig::default(),
            per_item_timeout_ms: Some(500),
            deadline: Some(Timestamp::UNIX_EPOCH),
            auth: Some(AuthContext::default()),
        };
        let bytes = serde_json::to_vec(&task).unwrap();
        let back: TransferTask = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_result_accessors() {
        let object = RemoteObject::from_url("https://host/a.nc", None).unwrap();
        let ok = TransferResult::from_outcome(
            object.clone(),
            TransferOutcome::success(
                0,
                TransferOutput::File {
                    path: PathBuf::from("/tmp/a.nc"),
                    bytes: 10,
                    skipped: false,
                },
                1,
            ),
        );
        assert!(ok.is_success());
        assert_eq!(ok.local_path(), Some(Path::new("/tmp/a.nc")));
        assert!(ok.opened().is_none());

        let failed = TransferResult::failed(
            object,
            TransferError::new(FailureKind::Permanent, "no link"),
        );
        assert!(!failed.is_success());
        assert_eq!(failed.attempts, 0);
    }
}
