//! Batch transfer orchestration
//!
//! [`TransferOrchestrator::run`] turns a planned batch into one
//! [`TransferResult`] per object, in input order. Batch-level preconditions
//! (empty input, unusable target directory, missing credentials) are returned
//! as errors; anything that goes wrong with a single object is recorded on
//! that object's result and never stops its siblings.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;

use crate::auth::AuthContext;
use crate::credential::{Credential, HttpAuth};
use crate::error::{Error, Result};
use crate::executor::{ExecutionBackend, SessionAffinity, TaskRunner};
use crate::object::RemoteObject;
use crate::provider::CredentialProvider;
use crate::resolver::{AccessMethod, AccessPlan};
use crate::retry::retry_with_backoff;
use crate::traits::{ObjectTransport, Session, TransportFactory};
use crate::transfer::{
    FailureKind, OpenedObject, ProgressObserver, TransferError, TransferOp, TransferOptions,
    TransferOutcome, TransferOutput, TransferResult, TransferTask,
};

/// Auth material obtained once per batch
#[derive(Debug, Clone, Default)]
pub struct BatchAuth {
    pub credential: Option<Credential>,
    pub http: Option<HttpAuth>,
}

/// Runs planned batches on an execution backend
pub struct TransferOrchestrator {
    credentials: Arc<CredentialProvider>,
    factory: Arc<dyn TransportFactory>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl TransferOrchestrator {
    pub fn new(credentials: Arc<CredentialProvider>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            credentials,
            factory,
            observer: None,
        }
    }

    /// Report each completed item to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Fetch the auth material `plan` needs
    pub async fn batch_auth(&self, plan: &AccessPlan) -> Result<BatchAuth> {
        match plan.method {
            AccessMethod::Direct => {
                let scope = plan.scope.as_ref().ok_or_else(|| {
                    Error::InvalidInput("direct access plan has no credential scope".into())
                })?;
                Ok(BatchAuth {
                    credential: Some(self.credentials.acquire(scope).await?),
                    http: None,
                })
            }
            AccessMethod::External => Ok(BatchAuth {
                credential: None,
                http: Some(self.credentials.http_auth().await?),
            }),
        }
    }

    /// Build one session in the caller's process
    pub async fn session(&self, method: AccessMethod, auth: &BatchAuth) -> Result<Session> {
        match (method, &auth.credential, &auth.http) {
            (AccessMethod::Direct, Some(credential), _) => self.factory.direct(credential).await,
            (AccessMethod::External, _, Some(http)) => self.factory.external(http).await,
            (method, _, _) => Err(Error::Auth(format!(
                "no usable credentials for {method} access"
            ))),
        }
    }

    /// Run `op` over every object using `plan`
    pub async fn run(
        &self,
        objects: &[RemoteObject],
        plan: &AccessPlan,
        backend: &dyn ExecutionBackend,
        op: TransferOp,
        options: &TransferOptions,
    ) -> Result<Vec<TransferResult>> {
        check_preconditions(objects, &op).await?;
        let auth = self.batch_auth(plan).await?;
        self.dispatch(objects, plan.method, auth, backend, op, options)
            .await
    }

    /// Like [`run`](Self::run), with auth material the caller already holds
    pub async fn run_with(
        &self,
        objects: &[RemoteObject],
        method: AccessMethod,
        auth: BatchAuth,
        backend: &dyn ExecutionBackend,
        op: TransferOp,
        options: &TransferOptions,
    ) -> Result<Vec<TransferResult>> {
        check_preconditions(objects, &op).await?;
        self.dispatch(objects, method, auth, backend, op, options)
            .await
    }

    async fn dispatch(
        &self,
        objects: &[RemoteObject],
        method: AccessMethod,
        auth: BatchAuth,
        backend: &dyn ExecutionBackend,
        op: TransferOp,
        options: &TransferOptions,
    ) -> Result<Vec<TransferResult>> {
        let (runner, handoff): (Arc<dyn TaskRunner>, Option<AuthContext>) =
            match backend.session_affinity() {
                SessionAffinity::Shareable => {
                    let session = self.session(method, &auth).await?;
                    let runner: Arc<dyn TaskRunner> = Arc::new(SessionRunner::new(session));
                    (runner, None)
                }
                SessionAffinity::NonShareable => {
                    let context = AuthContext::capture(auth.credential, auth.http.as_ref());
                    if !context.is_usable() {
                        return Err(Error::Auth(format!(
                            "no usable credentials for {method} access"
                        )));
                    }
                    let runner: Arc<dyn TaskRunner> =
                        Arc::new(RehydratingRunner::new(Arc::clone(&self.factory)));
                    (runner, Some(context))
                }
            };

        let runner: Arc<dyn TaskRunner> = match &self.observer {
            Some(observer) => Arc::new(ObservedRunner {
                inner: runner,
                observer: Arc::clone(observer),
            }),
            None => runner,
        };

        let deadline = options.batch_timeout.and_then(deadline_after);
        let tasks: Vec<TransferTask> = objects
            .iter()
            .enumerate()
            .map(|(index, object)| TransferTask {
                index,
                object: object.clone(),
                method,
                op: op.clone(),
                retry: options.retry.clone(),
                per_item_timeout_ms: options
                    .per_item_timeout
                    .map(|d| d.as_millis().min(u64::MAX as u128) as u64),
                deadline,
                auth: handoff.clone(),
            })
            .collect();

        tracing::info!(
            items = tasks.len(),
            %method,
            backend = %backend.kind(),
            workers = backend.workers(),
            "Starting transfer batch"
        );

        let outcomes = backend.map(tasks, runner).await?;

        let results: Vec<TransferResult> = objects
            .iter()
            .cloned()
            .zip(outcomes)
            .map(|(object, outcome)| TransferResult::from_outcome(object, outcome))
            .collect();

        let failed = results.iter().filter(|r| !r.is_success()).count();
        tracing::info!(
            succeeded = results.len() - failed,
            failed,
            "Transfer batch complete"
        );
        Ok(results)
    }
}

async fn check_preconditions(objects: &[RemoteObject], op: &TransferOp) -> Result<()> {
    if objects.is_empty() {
        return Err(Error::InvalidInput("No objects to transfer".into()));
    }
    if let TransferOp::Download { target_dir, .. } = op {
        ensure_target_dir(target_dir).await?;
    }
    Ok(())
}

async fn ensure_target_dir(dir: &Path) -> Result<()> {
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::InvalidInput(format!(
            "Target is not a directory: {}",
            dir.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| {
                Error::InvalidInput(format!(
                    "Cannot create target directory {}: {e}",
                    dir.display()
                ))
            }),
        Err(e) => Err(Error::InvalidInput(format!(
            "Cannot use target directory {}: {e}",
            dir.display()
        ))),
    }
}

fn deadline_after(budget: Duration) -> Option<Timestamp> {
    let millis = i64::try_from(budget.as_millis()).ok()?;
    let now = Timestamp::now().as_millisecond();
    Timestamp::from_millisecond(now.saturating_add(millis)).ok()
}

/// Time left before `deadline`; `None` once it has passed
fn remaining(deadline: Timestamp) -> Option<Duration> {
    let left = deadline.as_millisecond() - Timestamp::now().as_millisecond();
    (left > 0).then(|| Duration::from_millis(left as u64))
}

/// Runs tasks against a session built once by the caller.
///
/// Every pool worker goes through the same transport. Transports only take
/// `&self` and are `Send + Sync`, so one authenticated client serves all
/// workers concurrently; there is no per-worker copy.
pub struct SessionRunner {
    session: Session,
}

impl SessionRunner {
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl TaskRunner for SessionRunner {
    async fn run(&self, task: TransferTask) -> TransferOutcome {
        if let Some(outcome) = precheck(&task).await {
            return outcome;
        }
        execute(&self.session, task).await
    }
}

/// Rebuilds a session from the task's [`AuthContext`] before running it.
///
/// Holds nothing but a factory, so it is safe to hand to workers that share
/// no memory with the caller.
pub struct RehydratingRunner {
    factory: Arc<dyn TransportFactory>,
}

impl RehydratingRunner {
    pub fn new(factory: Arc<dyn TransportFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl TaskRunner for RehydratingRunner {
    async fn run(&self, task: TransferTask) -> TransferOutcome {
        if let Some(outcome) = precheck(&task).await {
            return outcome;
        }
        let Some(context) = &task.auth else {
            return TransferOutcome::failure(
                task.index,
                TransferError::new(FailureKind::Rehydration, "task carries no auth context"),
                0,
            );
        };
        match context.rehydrate(task.method, self.factory.as_ref()).await {
            Ok(session) => execute(&session, task).await,
            Err(e) => {
                tracing::warn!(index = task.index, error = %e, "Worker could not rebuild session");
                TransferOutcome::failure(task.index, TransferError::from(&e), 0)
            }
        }
    }
}

struct ObservedRunner {
    inner: Arc<dyn TaskRunner>,
    observer: Arc<dyn ProgressObserver>,
}

#[async_trait]
impl TaskRunner for ObservedRunner {
    async fn run(&self, task: TransferTask) -> TransferOutcome {
        let outcome = self.inner.run(task).await;
        self.observer.on_item(&outcome);
        outcome
    }
}

/// Outcomes decided without touching the network
async fn precheck(task: &TransferTask) -> Option<TransferOutcome> {
    if let Some(deadline) = task.deadline
        && remaining(deadline).is_none()
    {
        return Some(TransferOutcome::failure(
            task.index,
            TransferError::new(FailureKind::Timeout, "batch deadline passed before start"),
            0,
        ));
    }

    if let TransferOp::Download { overwrite: false, .. } = task.op {
        let target = task.target_path()?;
        if let Ok(meta) = tokio::fs::metadata(&target).await
            && meta.is_file()
        {
            tracing::debug!(path = %target.display(), "Target exists, skipping");
            return Some(TransferOutcome::success(
                task.index,
                TransferOutput::File {
                    path: target,
                    bytes: meta.len(),
                    skipped: true,
                },
                0,
            ));
        }
    }
    None
}

async fn execute(session: &Session, task: TransferTask) -> TransferOutcome {
    let index = task.index;
    let Some(url) = task.object.url_for(task.method).map(str::to_string) else {
        return TransferOutcome::failure(
            index,
            TransferError::new(
                FailureKind::Permanent,
                format!("object has no {} link", task.method),
            ),
            0,
        );
    };

    let per_item = task.per_item_timeout_ms.map(Duration::from_millis);
    let deadline = task.deadline;
    let transport: &dyn ObjectTransport = session.as_ref();
    let task_ref = &task;
    let url_ref = url.as_str();
    let mut attempts = 0;

    let result = retry_with_backoff(
        &task.retry,
        |attempt| {
            attempts = attempt;
            async move {
                let budget = attempt_budget(per_item, deadline)?;
                let url = url_ref;
                let work = transfer_once(transport, url, task_ref);
                match budget {
                    Some(budget) => tokio::time::timeout(budget, work)
                        .await
                        .map_err(|_| Error::Timeout(format!("{url}: no response within {budget:?}")))?,
                    None => work.await,
                }
            }
        },
        |e| e.is_retryable() && deadline.is_none_or(|d| remaining(d).is_some()),
    )
    .await;

    match result {
        Ok(output) => TransferOutcome::success(index, output, attempts),
        Err(e) => {
            tracing::debug!(index, attempts, error = %e, "Item failed");
            TransferOutcome::failure(index, TransferError::from(&e), attempts)
        }
    }
}

fn attempt_budget(per_item: Option<Duration>, deadline: Option<Timestamp>) -> Result<Option<Duration>> {
    let left = match deadline {
        Some(deadline) => Some(
            remaining(deadline).ok_or_else(|| Error::Timeout("batch deadline passed".into()))?,
        ),
        None => None,
    };
    Ok(match (per_item, left) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    })
}

async fn transfer_once(
    session: &dyn ObjectTransport,
    url: &str,
    task: &TransferTask,
) -> Result<TransferOutput> {
    match &task.op {
        TransferOp::Download { .. } => {
            let target = task.target_path().ok_or_else(|| {
                Error::InvalidInput(format!("cannot derive a file name from {url}"))
            })?;
            let partial = PartialFile::new(partial_path(&target));
            let bytes = session.download(url, partial.path()).await?;
            tokio::fs::rename(partial.path(), &target).await?;
            partial.keep();
            Ok(TransferOutput::File {
                path: target,
                bytes,
                skipped: false,
            })
        }
        TransferOp::Open => {
            let size = session.size(url).await?;
            Ok(TransferOutput::Stream(OpenedObject {
                url: url.to_string(),
                method: task.method,
                size,
                record_id: task.object.record_id.clone(),
            }))
        }
    }
}

/// In-progress download file, removed on drop unless kept.
///
/// Dropping covers failed attempts as well as attempts abandoned by a
/// timeout, where the download future is dropped mid-write.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not remove partial file");
        }
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::executor::{BoundedPool, Distributed, Sequential};
    use crate::scope::Scope;
    use crate::traits::MockIdentityProvider;
    use jiff::SignedDuration;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Per-URL scripted failures; everything else succeeds
    #[derive(Default)]
    struct ScriptedTransport {
        calls: AtomicUsize,
        failures: Mutex<HashMap<String, Vec<Error>>>,
        delay: Option<Duration>,
        /// Hang after writing part of the file
        stall: Option<Duration>,
    }

    impl ScriptedTransport {
        fn fail(self, url: &str, errors: Vec<Error>) -> Self {
            self.failures.lock().unwrap().insert(url.to_string(), errors);
            self
        }

        fn next_failure(&self, url: &str) -> Option<Error> {
            let mut failures = self.failures.lock().unwrap();
            let queue = failures.get_mut(url)?;
            if queue.is_empty() {
                None
            } else {
                Some(queue.remove(0))
            }
        }
    }

    #[async_trait]
    impl ObjectTransport for ScriptedTransport {
        fn method(&self) -> AccessMethod {
            AccessMethod::External
        }

        async fn read_range(&self, _url: &str, _offset: u64, len: u64) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![b'x'; len as usize])
        }

        async fn size(&self, url: &str) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.next_failure(url) {
                Some(e) => Err(e),
                None => Ok(url.len() as u64),
            }
        }

        async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(e) = self.next_failure(url) {
                return Err(e);
            }
            tokio::fs::write(dest, url.as_bytes()).await?;
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            Ok(url.len() as u64)
        }
    }

    struct SharedFactory {
        transport: Arc<ScriptedTransport>,
        built: AtomicUsize,
    }

    impl SharedFactory {
        fn new(transport: ScriptedTransport) -> Arc<Self> {
            Arc::new(Self {
                transport: Arc::new(transport),
                built: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TransportFactory for SharedFactory {
        async fn direct(&self, _credential: &Credential) -> Result<Session> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(self.transport.clone())
        }

        async fn external(&self, _auth: &HttpAuth) -> Result<Session> {
            self.built.fetch_add(1, Ordering::SeqCst);
            Ok(self.transport.clone())
        }
    }

    fn identity() -> MockIdentityProvider {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_http_auth()
            .returning(|| Ok(HttpAuth::bearer("token")));
        identity.expect_s3_credentials().returning(|_| {
            let expires_at = Timestamp::now()
                .checked_add(SignedDuration::from_hours(1))
                .unwrap();
            Ok(Credential::new("AKIA", "s", "t", expires_at, "us-west-2"))
        });
        identity
    }

    fn orchestrator(factory: Arc<SharedFactory>) -> TransferOrchestrator {
        TransferOrchestrator::new(Arc::new(CredentialProvider::new(Arc::new(identity()))), factory)
    }

    fn objects(n: usize) -> Vec<RemoteObject> {
        (0..n)
            .map(|i| RemoteObject::from_url(&format!("https://data.example/f{i}.nc"), None).unwrap())
            .collect()
    }

    fn fast_options() -> TransferOptions {
        TransferOptions {
            retry: RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 5,
            },
            ..TransferOptions::default()
        }
    }

    fn download(dir: &TempDir) -> TransferOp {
        TransferOp::Download {
            target_dir: dir.path().to_path_buf(),
            overwrite: false,
        }
    }

    #[tokio::test]
    async fn test_existing_target_makes_no_transport_calls() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f0.nc"), b"already here").unwrap();
        let factory = SharedFactory::new(ScriptedTransport::default());
        let orch = orchestrator(Arc::clone(&factory));

        let results = orch
            .run(
                &objects(1),
                &AccessPlan::external(None),
                &Sequential::new(),
                download(&dir),
                &fast_options(),
            )
            .await
            .unwrap();

        assert!(results[0].is_success());
        assert_eq!(results[0].attempts, 0);
        assert_eq!(
            results[0].output,
            Some(TransferOutput::File {
                path: dir.path().join("f0.nc"),
                bytes: 12,
                skipped: true,
            })
        );
        assert_eq!(factory.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_two_transient_failures_then_success() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::default().fail(
            "https://data.example/f0.nc",
            vec![
                Error::Network("connection reset".into()),
                Error::Network("503".into()),
            ],
        );
        let factory = SharedFactory::new(transport);
        let orch = orchestrator(Arc::clone(&factory));

        let results = orch
            .run(
                &objects(1),
                &AccessPlan::external(None),
                &Sequential::new(),
                download(&dir),
                &fast_options(),
            )
            .await
            .unwrap();

        assert!(results[0].is_success(), "{:?}", results[0].error);
        assert_eq!(results[0].attempts, 3);
        assert_eq!(factory.transport.calls.load(Ordering::SeqCst), 3);
        assert!(dir.path().join("f0.nc").exists());
        assert!(!dir.path().join("f0.nc.part").exists());
    }

    #[tokio::test]
    async fn test_mixed_outcomes_keep_order_and_isolation() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::default()
            .fail(
                "https://data.example/f1.nc",
                vec![Error::NotFound("gone".into())],
            )
            .fail(
                "https://data.example/f4.nc",
                vec![
                    Error::Network("a".into()),
                    Error::Network("b".into()),
                    Error::Network("c".into()),
                ],
            );
        let factory = SharedFactory::new(transport);
        let orch = orchestrator(Arc::clone(&factory));
        let input = objects(6);

        let results = orch
            .run(
                &input,
                &AccessPlan::external(None),
                &BoundedPool::new(3),
                download(&dir),
                &fast_options(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 6);
        for (result, object) in results.iter().zip(&input) {
            assert_eq!(&result.object, object);
        }
        let notfound = results[1].error.as_ref().unwrap();
        assert_eq!(notfound.kind, FailureKind::Permanent);
        assert_eq!(results[1].attempts, 1);
        let exhausted = results[4].error.as_ref().unwrap();
        assert_eq!(exhausted.kind, FailureKind::Transient);
        assert_eq!(results[4].attempts, 3);
        for i in [0, 2, 3, 5] {
            assert!(results[i].is_success());
        }
        // One session for the whole shareable batch.
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distributed_rehydrates_per_item() {
        let factory = SharedFactory::new(ScriptedTransport::default());
        let orch = orchestrator(Arc::clone(&factory));

        let results = orch
            .run(
                &objects(4),
                &AccessPlan::external(None),
                &Distributed::new(2),
                TransferOp::Open,
                &fast_options(),
            )
            .await
            .unwrap();

        assert!(results.iter().all(TransferResult::is_success));
        assert_eq!(
            results[2].opened().unwrap().url,
            "https://data.example/f2.nc"
        );
        assert_eq!(factory.built.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_expired_context_fails_every_item() {
        let factory = SharedFactory::new(ScriptedTransport::default());
        let orch = orchestrator(Arc::clone(&factory));
        let expired = Credential::new(
            "AKIA",
            "s",
            "t",
            Timestamp::now()
                .checked_sub(SignedDuration::from_mins(1))
                .unwrap(),
            "us-west-2",
        );
        let objects: Vec<RemoteObject> = (0..3)
            .map(|i| RemoteObject::from_url(&format!("s3://b/k{i}"), Some("POCLOUD")).unwrap())
            .collect();

        let results = orch
            .run_with(
                &objects,
                AccessMethod::Direct,
                BatchAuth {
                    credential: Some(expired),
                    http: None,
                },
                &Distributed::new(2),
                TransferOp::Open,
                &fast_options(),
            )
            .await
            .unwrap();

        assert!(results
            .iter()
            .all(|r| r.error.as_ref().unwrap().kind == FailureKind::Rehydration));
        assert_eq!(factory.built.load(Ordering::SeqCst), 0);
        assert_eq!(factory.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_per_item_timeout() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport {
            delay: Some(Duration::from_millis(500)),
            ..ScriptedTransport::default()
        };
        let orch = orchestrator(SharedFactory::new(transport));
        let options = TransferOptions {
            retry: RetryConfig {
                max_attempts: 1,
                ..fast_options().retry
            },
            per_item_timeout: Some(Duration::from_millis(20)),
            ..fast_options()
        };

        let results = orch
            .run(
                &objects(1),
                &AccessPlan::external(None),
                &Sequential::new(),
                download(&dir),
                &options,
            )
            .await
            .unwrap();

        assert_eq!(results[0].error.as_ref().unwrap().kind, FailureKind::Timeout);
        assert!(!dir.path().join("f0.nc").exists());
        assert!(!dir.path().join("f0.nc.part").exists());
    }

    #[tokio::test]
    async fn test_timeout_mid_write_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport {
            stall: Some(Duration::from_millis(300)),
            ..ScriptedTransport::default()
        };
        let orch = orchestrator(SharedFactory::new(transport));
        let options = TransferOptions {
            retry: RetryConfig {
                max_attempts: 1,
                ..fast_options().retry
            },
            per_item_timeout: Some(Duration::from_millis(50)),
            ..fast_options()
        };

        let results = orch
            .run(
                &objects(1),
                &AccessPlan::external(None),
                &Sequential::new(),
                download(&dir),
                &options,
            )
            .await
            .unwrap();

        assert_eq!(results[0].error.as_ref().unwrap().kind, FailureKind::Timeout);
        assert!(!dir.path().join("f0.nc.part").exists());
        assert!(!dir.path().join("f0.nc").exists());
    }

    #[tokio::test]
    async fn test_failed_download_removes_partial_file() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::default().fail(
            "https://data.example/f0.nc",
            vec![Error::NotFound("gone".into())],
        );
        let orch = orchestrator(SharedFactory::new(transport));

        let results = orch
            .run(
                &objects(1),
                &AccessPlan::external(None),
                &Sequential::new(),
                download(&dir),
                &fast_options(),
            )
            .await
            .unwrap();

        assert!(!results[0].is_success());
        assert!(!dir.path().join("f0.nc.part").exists());
    }

    #[tokio::test]
    async fn test_elapsed_batch_deadline_abandons_items() {
        let factory = SharedFactory::new(ScriptedTransport::default());
        let orch = orchestrator(Arc::clone(&factory));
        let options = TransferOptions {
            batch_timeout: Some(Duration::ZERO),
            ..fast_options()
        };

        let results = orch
            .run(
                &objects(3),
                &AccessPlan::external(None),
                &BoundedPool::new(2),
                TransferOp::Open,
                &options,
            )
            .await
            .unwrap();

        assert!(results
            .iter()
            .all(|r| r.error.as_ref().unwrap().kind == FailureKind::Timeout));
        assert_eq!(factory.transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_preconditions() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(SharedFactory::new(ScriptedTransport::default()));
        let plan = AccessPlan::external(None);

        let empty = orch
            .run(&[], &plan, &Sequential::new(), TransferOp::Open, &fast_options())
            .await;
        assert!(matches!(empty, Err(Error::InvalidInput(_))));

        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        let bad_target = orch
            .run(
                &objects(1),
                &plan,
                &Sequential::new(),
                TransferOp::Download {
                    target_dir: file,
                    overwrite: false,
                },
                &fast_options(),
            )
            .await;
        assert!(matches!(bad_target, Err(Error::InvalidInput(_))));

        let unscoped_direct = AccessPlan {
            method: AccessMethod::Direct,
            scope: None,
        };
        assert!(orch
            .run(&objects(1), &unscoped_direct, &Sequential::new(), TransferOp::Open, &fast_options())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_rejected_before_auth() {
        // No expectations: any identity call fails the test.
        let credentials = Arc::new(CredentialProvider::new(Arc::new(MockIdentityProvider::new())));
        let orch = TransferOrchestrator::new(
            credentials,
            SharedFactory::new(ScriptedTransport::default()),
        );

        let err = orch
            .run(
                &[],
                &AccessPlan::direct(Scope::Provider("POCLOUD".into())),
                &Sequential::new(),
                TransferOp::Open,
                &fast_options(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_missing_target_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        let orch = orchestrator(SharedFactory::new(ScriptedTransport::default()));

        let results = orch
            .run(
                &objects(2),
                &AccessPlan::direct(Scope::Provider("POCLOUD".into())),
                &Sequential::new(),
                TransferOp::Download {
                    target_dir: nested.clone(),
                    overwrite: true,
                },
                &fast_options(),
            )
            .await
            .unwrap();

        // Direct plan over https-only objects: no direct link to use.
        assert!(results
            .iter()
            .all(|r| r.error.as_ref().unwrap().kind == FailureKind::Permanent));
        assert!(nested.is_dir());
    }

    #[derive(Default)]
    struct CountingObserver {
        items: AtomicUsize,
        failed: AtomicUsize,
    }

    impl ProgressObserver for CountingObserver {
        fn on_item(&self, outcome: &TransferOutcome) {
            self.items.fetch_add(1, Ordering::SeqCst);
            if outcome.error.is_some() {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_observer_sees_every_item() {
        let observer = Arc::new(CountingObserver::default());
        let orch = orchestrator(SharedFactory::new(ScriptedTransport::default()))
            .with_observer(observer.clone());

        orch.run(
            &objects(5),
            &AccessPlan::external(None),
            &BoundedPool::new(2),
            TransferOp::Open,
            &fast_options(),
        )
        .await
        .unwrap();

        assert_eq!(observer.items.load(Ordering::SeqCst), 5);
        assert_eq!(observer.failed.load(Ordering::SeqCst), 0);
    }
}
