//! Credential provider with single-flight refresh
//!
//! Wraps an [`IdentityProvider`] with the [`CredentialCache`]. Concurrent
//! `acquire` calls for one scope are collapsed into a single request to the
//! Identity Provider: the first caller fetches and every caller that joined
//! the same flight gets its outcome, failures included.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::cache::CredentialCache;
use crate::credential::{Credential, HttpAuth};
use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::traits::IdentityProvider;

/// Outcome of one Identity Provider request, shared by everyone who waited on it
type Flight = Arc<OnceCell<Result<Credential>>>;

/// Fetches, caches and hands out credentials per scope
pub struct CredentialProvider {
    identity: Arc<dyn IdentityProvider>,
    cache: CredentialCache,
    inflight: Mutex<HashMap<Scope, Flight>>,
    http: Mutex<Option<HttpAuth>>,
}

impl CredentialProvider {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            cache: CredentialCache::new(),
            inflight: Mutex::new(HashMap::new()),
            http: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    /// Get a usable credential for `scope`, fetching it on miss or expiry.
    ///
    /// A failure from the Identity Provider reaches every caller that joined
    /// the request and is not cached; choosing a fallback is up to the caller.
    pub async fn acquire(&self, scope: &Scope) -> Result<Credential> {
        if let Some(credential) = self.cache.get(scope) {
            return Ok(credential);
        }

        let flight = {
            let mut map = self.inflight.lock().await;
            Arc::clone(map.entry(scope.clone()).or_default())
        };
        let outcome = flight.get_or_init(|| self.fetch(scope)).await;

        {
            let mut map = self.inflight.lock().await;
            if map.get(scope).is_some_and(|current| Arc::ptr_eq(current, &flight)) {
                map.remove(scope);
            }
        }

        match outcome {
            Ok(credential) => Ok(credential.clone()),
            Err(e) => Err(replay(e)),
        }
    }

    async fn fetch(&self, scope: &Scope) -> Result<Credential> {
        if let Some(credential) = self.cache.get(scope) {
            tracing::debug!(%scope, "Credential filled by concurrent request");
            return Ok(credential);
        }

        tracing::debug!(%scope, "Requesting temporary credentials");
        let credential = self.identity.s3_credentials(scope).await?;

        if credential.is_expired() {
            tracing::warn!(
                %scope,
                expires_at = %credential.expires_at,
                "Identity provider issued an already expired credential"
            );
        } else {
            self.cache.put(scope.clone(), credential.clone());
        }

        Ok(credential)
    }

    /// Get the HTTPS authentication material, fetching it once per provider lifetime
    pub async fn http_auth(&self) -> Result<HttpAuth> {
        let mut slot = self.http.lock().await;
        if let Some(auth) = slot.as_ref() {
            return Ok(auth.clone());
        }

        let auth = self.identity.http_auth().await?;
        *slot = Some(auth.clone());
        Ok(auth)
    }

    /// Forget every cached credential and token
    pub async fn logout(&self) {
        self.cache.invalidate_all();
        *self.http.lock().await = None;
    }
}

/// Copy of a shared flight failure for one caller
fn replay(error: &Error) -> Error {
    match error {
        Error::CredentialAcquisition {
            scope,
            message,
            transient,
        } => Error::CredentialAcquisition {
            scope: scope.clone(),
            message: message.clone(),
            transient: *transient,
        },
        Error::Config(m) => Error::Config(m.clone()),
        Error::InvalidInput(m) => Error::InvalidInput(m.clone()),
        Error::Auth(m) => Error::Auth(m.clone()),
        Error::NotFound(m) => Error::NotFound(m.clone()),
        Error::Network(m) => Error::Network(m.clone()),
        Error::Timeout(m) => Error::Timeout(m.clone()),
        other if other.is_retryable() => Error::Network(other.to_string()),
        other => Error::General(other.to_string()),
    }
}
