//! End-to-end batch scenarios against in-memory fakes

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use tempfile::TempDir;

use ef_core::{
    AccessMethod, AccessResolver, BatchAuth, BoundedPool, Credential, CredentialProvider,
    Distributed, Error, FailureKind, HttpAuth, IdentityProvider, ObjectTransport, ProbeConfig,
    RemoteObject, Result, RetryConfig, Scope, Session, TransferOp, TransferOptions,
    TransferOrchestrator, TransportFactory,
};

struct StaticIdentity {
    expires_in: SignedDuration,
    calls: AtomicUsize,
}

impl StaticIdentity {
    fn new(expires_in: SignedDuration) -> Arc<Self> {
        Arc::new(Self {
            expires_in,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn s3_credentials(&self, _scope: &Scope) -> Result<Credential> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let expires_at = Timestamp::now().checked_add(self.expires_in).unwrap();
        Ok(Credential::new("AKIA", "secret", "token", expires_at, "us-west-2"))
    }

    async fn http_auth(&self) -> Result<HttpAuth> {
        Ok(HttpAuth::bearer("urs-token"))
    }
}

/// Counts every call; direct reads fail when `reachable` is false
struct CountingTransport {
    method: AccessMethod,
    reachable: bool,
    reads: AtomicUsize,
    downloads: AtomicUsize,
}

impl CountingTransport {
    fn new(method: AccessMethod, reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            method,
            reachable,
            reads: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectTransport for CountingTransport {
    fn method(&self) -> AccessMethod {
        self.method
    }

    async fn read_range(&self, _url: &str, _offset: u64, _len: u64) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(Error::Network("connection refused".into()));
        }
        Ok(b"01234".to_vec())
    }

    async fn size(&self, _url: &str) -> Result<u64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(5)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(dest, url).await?;
        Ok(url.len() as u64)
    }
}

struct Factory {
    direct: Arc<CountingTransport>,
    external: Arc<CountingTransport>,
}

impl Factory {
    fn new(in_region: bool) -> Arc<Self> {
        Arc::new(Self {
            direct: CountingTransport::new(AccessMethod::Direct, in_region),
            external: CountingTransport::new(AccessMethod::External, true),
        })
    }
}

#[async_trait]
impl TransportFactory for Factory {
    async fn direct(&self, _credential: &Credential) -> Result<Session> {
        Ok(self.direct.clone())
    }

    async fn external(&self, _auth: &HttpAuth) -> Result<Session> {
        Ok(self.external.clone())
    }
}

fn cloud_objects() -> Vec<RemoteObject> {
    (0..5)
        .map(|n| RemoteObject {
            direct_url: Some(format!("s3://podaac-ops-cumulus-protected/SST/granule{n}.nc")),
            external_url: Some(format!(
                "https://archive.podaac.earthdata.nasa.gov/podaac-ops-cumulus-protected/SST/granule{n}.nc"
            )),
            size_hint: Some(1024),
            record_id: Some(format!("G{n}-POCLOUD")),
            provider: Some("POCLOUD".into()),
        })
        .collect()
}

fn options() -> TransferOptions {
    TransferOptions {
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        },
        ..TransferOptions::default()
    }
}

fn engine(
    identity: Arc<StaticIdentity>,
    factory: Arc<Factory>,
) -> (AccessResolver, TransferOrchestrator) {
    let credentials = Arc::new(CredentialProvider::new(identity));
    let resolver = AccessResolver::new(
        Arc::clone(&credentials),
        factory.clone(),
        ProbeConfig::default(),
    );
    (resolver, TransferOrchestrator::new(credentials, factory))
}

#[tokio::test]
async fn direct_access_in_region_on_bounded_pool() {
    let dir = TempDir::new().unwrap();
    let identity = StaticIdentity::new(SignedDuration::from_hours(1));
    let factory = Factory::new(true);
    let (resolver, orchestrator) = engine(identity.clone(), factory.clone());
    let objects = cloud_objects();

    let plan = resolver.resolve(&objects, None).await.unwrap();
    assert_eq!(plan.method, AccessMethod::Direct);

    let results = orchestrator
        .run(
            &objects,
            &plan,
            &BoundedPool::new(2),
            TransferOp::Download {
                target_dir: dir.path().to_path_buf(),
                overwrite: false,
            },
            &options(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
    for (n, result) in results.iter().enumerate() {
        assert!(result.error.is_none(), "item {n}: {:?}", result.error);
        let path = result.local_path().unwrap();
        assert!(path.exists());
        assert_eq!(path, dir.path().join(format!("granule{n}.nc")));
    }
    assert_eq!(factory.direct.downloads.load(Ordering::SeqCst), 5);
    assert_eq!(factory.external.calls(), 0);
    // Probe and batch share the cached credential.
    assert_eq!(identity.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn probe_failure_falls_back_to_https() {
    let dir = TempDir::new().unwrap();
    let factory = Factory::new(false);
    let (resolver, orchestrator) =
        engine(StaticIdentity::new(SignedDuration::from_hours(1)), factory.clone());
    let objects = cloud_objects();

    let plan = resolver.resolve(&objects, None).await.unwrap();
    assert_eq!(plan.method, AccessMethod::External);

    let results = orchestrator
        .run(
            &objects,
            &plan,
            &BoundedPool::new(2),
            TransferOp::Download {
                target_dir: dir.path().to_path_buf(),
                overwrite: false,
            },
            &options(),
        )
        .await
        .unwrap();

    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(factory.external.downloads.load(Ordering::SeqCst), 5);
    assert_eq!(factory.direct.downloads.load(Ordering::SeqCst), 0);
    assert_eq!(factory.direct.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_handoff_fails_every_item_on_distributed_workers() {
    let dir = TempDir::new().unwrap();
    let factory = Factory::new(true);
    let (_, orchestrator) = engine(
        StaticIdentity::new(SignedDuration::from_hours(1)),
        factory.clone(),
    );
    let expired = Credential::new(
        "AKIA",
        "secret",
        "token",
        Timestamp::now()
            .checked_sub(SignedDuration::from_mins(5))
            .unwrap(),
        "us-west-2",
    );

    let results = orchestrator
        .run_with(
            &cloud_objects(),
            AccessMethod::Direct,
            BatchAuth {
                credential: Some(expired),
                http: None,
            },
            &Distributed::new(3),
            TransferOp::Download {
                target_dir: dir.path().to_path_buf(),
                overwrite: false,
            },
            &options(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 5);
    for result in &results {
        let error = result.error.as_ref().expect("item should fail");
        assert_eq!(error.kind, FailureKind::Rehydration);
        assert_eq!(result.attempts, 0);
    }
    assert_eq!(factory.direct.calls(), 0);
    assert_eq!(factory.external.calls(), 0);
}
