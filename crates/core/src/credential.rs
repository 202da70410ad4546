//! Temporary credentials
//!
//! [`Credential`] is a short-lived (about one hour) object-store credential
//! issued per [`Scope`](crate::Scope). [`HttpAuth`] carries what the HTTPS
//! fallback needs: a bearer token plus optional extra headers and cookies.

use std::collections::BTreeMap;
use std::fmt;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

/// Credentials are treated as expired this long before their real expiry
/// so that a request never starts with a token about to lapse.
pub const SAFETY_MARGIN: SignedDuration = SignedDuration::from_secs(5 * 60);

/// Temporary object-store credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: Timestamp,
    pub region: String,
}

impl Credential {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expires_at: Timestamp,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expires_at,
            region: region.into(),
        }
    }

    /// Instant from which this credential must no longer be used
    pub fn usable_until(&self) -> Timestamp {
        self.expires_at
            .checked_sub(SAFETY_MARGIN)
            .unwrap_or(Timestamp::MIN)
    }

    /// Expired when `now >= expires_at - SAFETY_MARGIN`
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now >= self.usable_until()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Timestamp::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("region", &self.region)
            .finish()
    }
}

/// Authentication material for the HTTPS fallback
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpAuth {
    /// Earthdata Login bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// Session cookies
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies: BTreeMap<String, String>,
}

impl HttpAuth {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn is_usable(&self) -> bool {
        self.bearer_token.is_some() || !self.headers.is_empty() || !self.cookies.is_empty()
    }

    /// All headers to send, including `Authorization` when a token is present
    pub fn request_headers(&self) -> BTreeMap<String, String> {
        let mut headers = self.headers.clone();
        if let Some(token) = &self.bearer_token {
            headers
                .entry("Authorization".to_string())
                .or_insert_with(|| format!("Bearer {token}"));
        }
        headers
    }

    /// Cookies rendered as a single `Cookie` header value
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        Some(pairs.join("; "))
    }
}

impl fmt::Debug for HttpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAuth")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .finish()
    }
}
