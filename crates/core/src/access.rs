//! Batch API
//!
//! [`DataAccess`] is the explicit replacement for a process-wide login
//! session: construct it once with an identity provider and a transport
//! factory, hand it around, drop it (or call [`DataAccess::logout`]) when done.
//!
//! Heterogeneous input is split by provider, each partition gets its own
//! access plan, and results are merged back in input order.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::executor::ExecutionBackend;
use crate::object::{expand_sources, partition_by_provider, ObjectSource, Partition, RemoteObject};
use crate::orchestrator::TransferOrchestrator;
use crate::provider::CredentialProvider;
use crate::resolver::{AccessMethod, AccessPlan, AccessResolver, ProbeConfig};
use crate::scope::Scope;
use crate::stream::ObjectStream;
use crate::traits::{IdentityProvider, Session, TransportFactory};
use crate::transfer::{
    FailureKind, ProgressObserver, TransferError, TransferOp, TransferOptions, TransferResult,
};

/// Access plan chosen for one provider's objects
#[derive(Debug, Clone, Serialize)]
pub struct PartitionPlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub objects: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<AccessPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of opening one object
pub type StreamResult = std::result::Result<ObjectStream, TransferError>;

/// Logged-in entry point for downloads and streams
pub struct DataAccess {
    credentials: Arc<CredentialProvider>,
    factory: Arc<dyn TransportFactory>,
    resolver: AccessResolver,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl DataAccess {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        factory: Arc<dyn TransportFactory>,
        probe: ProbeConfig,
    ) -> Self {
        let credentials = Arc::new(CredentialProvider::new(identity));
        let resolver = AccessResolver::new(Arc::clone(&credentials), Arc::clone(&factory), probe);
        Self {
            credentials,
            factory,
            resolver,
            observer: None,
        }
    }

    /// Progress sink used when [`TransferOptions::show_progress`] is set
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn credentials(&self) -> &Arc<CredentialProvider> {
        &self.credentials
    }

    /// Forget every cached credential and token
    pub async fn logout(&self) {
        self.credentials.logout().await;
    }

    /// Resolve an access plan per provider without transferring anything
    pub async fn plan(&self, sources: Vec<ObjectSource>) -> Result<Vec<PartitionPlan>> {
        let objects = expand_nonempty(sources)?;
        let partitions = partition_by_provider(&objects);
        let plans = join_all(partitions.iter().map(|partition| async move {
            let scope = partition.scope();
            let planned = self.resolver.resolve(&partition.objects, scope.as_ref()).await;
            PartitionPlan {
                provider: partition.provider.clone(),
                objects: partition.objects.len(),
                error: planned.as_ref().err().map(ToString::to_string),
                plan: planned.ok(),
            }
        }))
        .await;
        Ok(plans)
    }

    /// Download every object into `target_dir`
    pub async fn download(
        &self,
        sources: Vec<ObjectSource>,
        target_dir: &Path,
        backend: &dyn ExecutionBackend,
        options: &TransferOptions,
    ) -> Result<Vec<TransferResult>> {
        let op = TransferOp::Download {
            target_dir: target_dir.to_path_buf(),
            overwrite: options.overwrite_existing,
        };
        let objects = expand_nonempty(sources)?;
        self.observe_batch(options, objects.len(), || {
            self.run_partitions(&objects, backend, op, options)
        })
        .await
    }

    /// Open every object for reading
    pub async fn open(
        &self,
        sources: Vec<ObjectSource>,
        backend: &dyn ExecutionBackend,
        options: &TransferOptions,
    ) -> Result<Vec<StreamResult>> {
        let objects = expand_nonempty(sources)?;
        let results = self
            .observe_batch(options, objects.len(), || {
                self.run_partitions(&objects, backend, TransferOp::Open, options)
            })
            .await?;

        // Streams are read in the caller's process, so they get a session
        // built here even when the checks ran on isolated workers.
        let mut streams = Vec::with_capacity(results.len());
        let mut sessions: Vec<((AccessMethod, Option<String>), Session)> = Vec::new();
        for result in results {
            let Some(opened) = result.opened().cloned() else {
                streams.push(Err(result.error.unwrap_or_else(|| {
                    TransferError::new(FailureKind::Permanent, "object was not opened")
                })));
                continue;
            };
            let key = (opened.method, result.object.provider.clone());
            let session = match sessions.iter().find(|(k, _)| k == &key) {
                Some((_, session)) => Ok(Arc::clone(session)),
                None => {
                    let built = self.caller_session(opened.method, key.1.as_deref()).await;
                    if let Ok(session) = &built {
                        sessions.push((key, Arc::clone(session)));
                    }
                    built
                }
            };
            streams.push(match session {
                Ok(session) => Ok(ObjectStream::new(session, opened)),
                Err(e) => Err(TransferError::from(&e)),
            });
        }
        Ok(streams)
    }

    async fn caller_session(&self, method: AccessMethod, provider: Option<&str>) -> Result<Session> {
        let plan = match method {
            AccessMethod::Direct => {
                let scope = provider.map(Scope::for_name).ok_or_else(|| {
                    Error::InvalidInput("direct access needs a provider".into())
                })?;
                AccessPlan::direct(scope)
            }
            AccessMethod::External => AccessPlan::external(None),
        };
        let orchestrator = self.orchestrator();
        let auth = orchestrator.batch_auth(&plan).await?;
        orchestrator.session(method, &auth).await
    }

    fn orchestrator(&self) -> TransferOrchestrator {
        TransferOrchestrator::new(Arc::clone(&self.credentials), Arc::clone(&self.factory))
    }

    async fn observe_batch<F, Fut>(
        &self,
        options: &TransferOptions,
        total: usize,
        work: F,
    ) -> Result<Vec<TransferResult>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<TransferResult>>>,
    {
        let observer = self.observer.as_ref().filter(|_| options.show_progress);
        if let Some(observer) = observer {
            observer.on_start(total);
        }
        let results = work().await;
        if let Some(observer) = observer {
            observer.on_finish();
        }
        results
    }

    async fn run_partitions(
        &self,
        objects: &[RemoteObject],
        backend: &dyn ExecutionBackend,
        op: TransferOp,
        options: &TransferOptions,
    ) -> Result<Vec<TransferResult>> {
        let mut orchestrator = self.orchestrator();
        if options.show_progress
            && let Some(observer) = &self.observer
        {
            orchestrator = orchestrator.with_observer(Arc::clone(observer));
        }

        let partitions = partition_by_provider(objects);
        let single = partitions.len() == 1;
        let mut merged: Vec<Option<TransferResult>> = vec![None; objects.len()];

        // One batch budget for every partition, measured from here.
        let started = Instant::now();
        for partition in partitions {
            let mut partition_options = options.clone();
            if let Some(budget) = options.batch_timeout {
                let left = budget.saturating_sub(started.elapsed());
                if left.is_zero() {
                    let error = TransferError::new(
                        FailureKind::Timeout,
                        "batch deadline passed before start",
                    );
                    for index in &partition.indices {
                        merged[*index] = Some(TransferResult::failed(
                            objects[*index].clone(),
                            error.clone(),
                        ));
                    }
                    continue;
                }
                partition_options.batch_timeout = Some(left);
            }

            let outcome = self
                .run_partition(&orchestrator, &partition, backend, op.clone(), &partition_options)
                .await;
            let results = match outcome {
                Ok(results) => results,
                // One provider failing must not hide the others' results.
                Err(e) if !single && !matches!(e, Error::InvalidInput(_)) => {
                    tracing::warn!(
                        provider = partition.provider.as_deref().unwrap_or("unknown"),
                        error = %e,
                        "Partition failed"
                    );
                    let error = TransferError::from(&e);
                    partition
                        .objects
                        .iter()
                        .map(|o| TransferResult::failed(o.clone(), error.clone()))
                        .collect()
                }
                Err(e) => return Err(e),
            };
            for (index, result) in partition.indices.iter().zip(results) {
                merged[*index] = Some(result);
            }
        }

        Ok(merged
            .into_iter()
            .zip(objects)
            .map(|(slot, object)| {
                slot.unwrap_or_else(|| {
                    TransferResult::failed(
                        object.clone(),
                        TransferError::new(FailureKind::Permanent, "object was not scheduled"),
                    )
                })
            })
            .collect())
    }

    async fn run_partition(
        &self,
        orchestrator: &TransferOrchestrator,
        partition: &Partition,
        backend: &dyn ExecutionBackend,
        op: TransferOp,
        options: &TransferOptions,
    ) -> Result<Vec<TransferResult>> {
        let scope = partition.scope();
        let plan = self.resolver.resolve(&partition.objects, scope.as_ref()).await?;
        tracing::info!(
            provider = partition.provider.as_deref().unwrap_or("unknown"),
            method = %plan.method,
            objects = partition.objects.len(),
            "Access plan resolved"
        );
        orchestrator
            .run(&partition.objects, &plan, backend, op, options)
            .await
    }
}

fn expand_nonempty(sources: Vec<ObjectSource>) -> Result<Vec<RemoteObject>> {
    let objects = expand_sources(sources)?;
    if objects.is_empty() {
        return Err(Error::InvalidInput("No objects to transfer".into()));
    }
    Ok(objects)
}
