//! Serializable authentication snapshot
//!
//! A live session cannot cross a process boundary. [`AuthContext`] captures
//! the material needed to build one (temporary credential, HTTP headers and
//! cookies, bearer token) as plain data; a worker on the other side calls
//! [`AuthContext::rehydrate`] to get its own session back.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::credential::{Credential, HttpAuth};
use crate::error::{Error, Result};
use crate::resolver::AccessMethod;
use crate::traits::{Session, TransportFactory};

/// Immutable auth snapshot, independent of any network handle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_headers: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_cookies: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urs_token: Option<String>,
}

impl AuthContext {
    /// Capture whatever is available for a batch
    pub fn capture(credential: Option<Credential>, http: Option<&HttpAuth>) -> Self {
        let http_headers = http
            .map(|h| h.headers.clone())
            .filter(|headers| !headers.is_empty());
        let http_cookies = http
            .map(|h| h.cookies.clone())
            .filter(|cookies| !cookies.is_empty());
        Self {
            credential,
            http_headers,
            http_cookies,
            urs_token: http.and_then(|h| h.bearer_token.clone()),
        }
    }

    /// At least one field is populated
    pub fn is_usable(&self) -> bool {
        self.credential.is_some()
            || self.http_headers.is_some()
            || self.http_cookies.is_some()
            || self.urs_token.is_some()
    }

    /// HTTPS auth material held by this context
    pub fn http_auth(&self) -> HttpAuth {
        HttpAuth {
            bearer_token: self.urs_token.clone(),
            headers: self.http_headers.clone().unwrap_or_default(),
            cookies: self.http_cookies.clone().unwrap_or_default(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Rehydration(format!("malformed auth context: {e}")))
    }

    /// Build a session for `method` from this snapshot.
    ///
    /// Fails with [`Error::Rehydration`] when the snapshot is empty, lacks what
    /// `method` needs, or holds a credential that has expired by now.
    pub async fn rehydrate(
        &self,
        method: AccessMethod,
        factory: &dyn TransportFactory,
    ) -> Result<Session> {
        self.rehydrate_at(method, factory, Timestamp::now()).await
    }

    pub async fn rehydrate_at(
        &self,
        method: AccessMethod,
        factory: &dyn TransportFactory,
        now: Timestamp,
    ) -> Result<Session> {
        if !self.is_usable() {
            return Err(Error::Rehydration("auth context is empty".into()));
        }

        match method {
            AccessMethod::Direct => {
                let credential = self.credential.as_ref().ok_or_else(|| {
                    Error::Rehydration("direct access requires a temporary credential".into())
                })?;
                if credential.is_expired_at(now) {
                    return Err(Error::Rehydration(format!(
                        "credential expired at {} (usable until {})",
                        credential.expires_at,
                        credential.usable_until()
                    )));
                }
                factory
                    .direct(credential)
                    .await
                    .map_err(|e| Error::Rehydration(e.to_string()))
            }
            AccessMethod::External => {
                let auth = self.http_auth();
                if !auth.is_usable() {
                    return Err(Error::Rehydration(
                        "external access requires a token, headers or cookies".into(),
                    ));
                }
                factory
                    .external(&auth)
                    .await
                    .map_err(|e| Error::Rehydration(e.to_string()))
            }
        }
    }
}
