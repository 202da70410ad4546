//! Seams to the outside world
//!
//! These traits decouple the engine from the Earthdata Login API, the AWS SDK
//! and the HTTP client. `ef-s3` provides the production implementations; tests
//! substitute fakes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::credential::{Credential, HttpAuth};
use crate::error::Result;
use crate::resolver::AccessMethod;
use crate::scope::Scope;

/// Issues bearer tokens and scoped temporary object-store credentials
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Temporary S3 credentials for a scope
    async fn s3_credentials(&self, scope: &Scope) -> Result<Credential>;

    /// Bearer token, headers and cookies for HTTPS access
    async fn http_auth(&self) -> Result<HttpAuth>;
}

/// An authenticated client able to read remote objects.
///
/// One transport is one "session": it is cheap to clone behind an [`Arc`]
/// and safe to share between threads of the same process.
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// Which access method this transport speaks
    fn method(&self) -> AccessMethod;

    /// Read `len` bytes starting at `offset`
    async fn read_range(&self, url: &str, offset: u64, len: u64) -> Result<Vec<u8>>;

    /// Size of the object in bytes
    async fn size(&self, url: &str) -> Result<u64>;

    /// Stream the whole object into `dest`, returning the number of bytes written
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Shared handle to an authenticated transport
pub type Session = Arc<dyn ObjectTransport>;

/// Builds sessions from credentials.
///
/// A factory holds no authentication state itself, so workers that cannot
/// share memory with the caller each keep their own and rebuild sessions from
/// an [`AuthContext`](crate::AuthContext).
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Session for the direct object-store protocol
    async fn direct(&self, credential: &Credential) -> Result<Session>;

    /// Session for the authenticated HTTPS fallback
    async fn external(&self, auth: &HttpAuth) -> Result<Session>;
}
