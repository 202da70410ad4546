//! ef-core: engine behind the earthfetch data-access client
//!
//! This crate provides:
//! - Scoped temporary credentials with a single-flight cache
//! - Access planning (direct object-store reads vs. HTTPS fallback)
//! - Execution backends with explicit session affinity
//! - Serializable auth handoff for memory-isolated workers
//! - Batch transfer orchestration with retry, timeouts and idempotent downloads
//! - Configuration management
//!
//! This crate is independent of any specific S3 SDK or HTTP client; those
//! live behind the traits in [`traits`].

pub mod access;
pub mod auth;
pub mod cache;
pub mod config;
pub mod credential;
pub mod error;
pub mod executor;
pub mod netrc;
pub mod object;
pub mod orchestrator;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod scope;
pub mod stream;
pub mod traits;
pub mod transfer;

pub use access::{DataAccess, PartitionPlan, StreamResult};
pub use auth::AuthContext;
pub use cache::CredentialCache;
pub use config::{Config, ConfigManager, LoginStrategy, RetryConfig, TransferConfig};
pub use credential::{Credential, HttpAuth};
pub use error::{Error, Result};
pub use executor::{
    BackendKind, BoundedPool, Distributed, ExecutionBackend, Sequential, SessionAffinity,
    TaskHandle, TaskRunner,
};
pub use object::{GranuleRecord, ObjectSource, RemoteObject};
pub use orchestrator::{BatchAuth, TransferOrchestrator};
pub use provider::CredentialProvider;
pub use resolver::{AccessMethod, AccessPlan, AccessResolver, ProbeConfig};
pub use retry::retry_with_backoff;
pub use scope::{EndpointOverride, Scope};
pub use stream::ObjectStream;
pub use traits::{IdentityProvider, ObjectTransport, Session, TransportFactory};
pub use transfer::{
    FailureKind, OpenedObject, ProgressObserver, TransferError, TransferOp, TransferOptions,
    TransferOutcome, TransferOutput, TransferResult, TransferTask,
};
