//! Access planning
//!
//! Decides, once per homogeneous batch, whether objects are read through the
//! direct object-store protocol or through the HTTPS fallback. Direct access
//! only works from inside the store's region, so the decision is made
//! empirically with a tiny probe read rather than guessed from configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object::RemoteObject;
use crate::provider::CredentialProvider;
use crate::scope::Scope;
use crate::traits::TransportFactory;

/// How objects in a batch are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMethod {
    /// Object-store protocol with temporary credentials
    Direct,
    /// Authenticated HTTPS
    External,
}

impl std::fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMethod::Direct => write!(f, "direct"),
            AccessMethod::External => write!(f, "external"),
        }
    }
}

/// Outcome of planning a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPlan {
    pub method: AccessMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
}

impl AccessPlan {
    pub fn direct(scope: Scope) -> Self {
        Self {
            method: AccessMethod::Direct,
            scope: Some(scope),
        }
    }

    pub fn external(scope: Option<Scope>) -> Self {
        Self {
            method: AccessMethod::External,
            scope,
        }
    }
}

/// Probe settings
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Number of bytes read from the first object
    pub bytes: u64,
    /// Time budget for credential fetch plus read
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            bytes: 10,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Chooses direct or external access for a batch
pub struct AccessResolver {
    credentials: Arc<CredentialProvider>,
    factory: Arc<dyn TransportFactory>,
    probe: ProbeConfig,
}

impl AccessResolver {
    pub fn new(
        credentials: Arc<CredentialProvider>,
        factory: Arc<dyn TransportFactory>,
        probe: ProbeConfig,
    ) -> Self {
        Self {
            credentials,
            factory,
            probe,
        }
    }

    /// Plan access for a batch of objects from one provider.
    ///
    /// Probe and credential failures are logged and turned into an external
    /// plan whenever every object has an HTTPS link; without one the batch
    /// fails with [`Error::NoRetrievableLink`].
    pub async fn resolve(
        &self,
        objects: &[RemoteObject],
        scope_hint: Option<&Scope>,
    ) -> Result<AccessPlan> {
        let first = objects
            .first()
            .ok_or_else(|| Error::InvalidInput("Cannot plan access for an empty batch".into()))?;

        let has_fallback = objects.iter().all(|o| o.external_url.is_some());
        let all_direct = objects.iter().all(|o| o.direct_url.is_some());

        let scope = scope_hint
            .cloned()
            .or_else(|| first.provider.as_deref().map(Scope::for_name));

        if !all_direct {
            if has_fallback {
                tracing::debug!("Batch has no direct links, using external access");
                return Ok(AccessPlan::external(scope));
            }
            return Err(Error::NoRetrievableLink(format!(
                "{} has neither a direct nor an HTTPS link",
                missing_link(objects)
            )));
        }

        let Some(scope) = scope else {
            if has_fallback {
                tracing::info!("No credential scope known for batch, using external access");
                return Ok(AccessPlan::external(None));
            }
            return Err(Error::NoRetrievableLink(
                "direct links need a provider to obtain credentials".into(),
            ));
        };

        // all_direct guarantees the first object has a direct link.
        let probe_url = first.direct_url.as_deref().unwrap_or_default();

        match self.probe(&scope, probe_url).await {
            Ok(()) => {
                tracing::info!(%scope, "Direct access probe succeeded");
                Ok(AccessPlan::direct(scope))
            }
            Err(e) if has_fallback => {
                tracing::warn!(%scope, error = %e, "Direct access not available, falling back to HTTPS");
                Ok(AccessPlan::external(Some(scope)))
            }
            Err(e) => Err(Error::NoRetrievableLink(format!(
                "direct access failed ({e}) and no HTTPS link exists"
            ))),
        }
    }

    async fn probe(&self, scope: &Scope, url: &str) -> Result<()> {
        let attempt = async {
            let credential = self.credentials.acquire(scope).await?;
            let session = self.factory.direct(&credential).await?;
            session.read_range(url, 0, self.probe.bytes).await
        };

        match tokio::time::timeout(self.probe.timeout, attempt).await {
            Ok(Ok(bytes)) => {
                tracing::debug!(url, bytes = bytes.len(), "Probe read complete");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::ProbeInconclusive(e.to_string())),
            Err(_) => Err(Error::ProbeInconclusive(format!(
                "no response within {:?}",
                self.probe.timeout
            ))),
        }
    }
}

fn missing_link(objects: &[RemoteObject]) -> String {
    objects
        .iter()
        .find(|o| o.direct_url.is_none() && o.external_url.is_none())
        .and_then(|o| o.record_id.clone())
        .unwrap_or_else(|| "an object".to_string())
}
