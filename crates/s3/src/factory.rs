//! Production transport factory

use std::sync::Arc;

use async_trait::async_trait;

use ef_core::{Credential, HttpAuth, Result, Session, TransportFactory};

use crate::client::S3Transport;
use crate::http::HttpTransport;

/// Builds S3 sessions for direct access and reqwest sessions for HTTPS
#[derive(Debug, Default, Clone, Copy)]
pub struct AwsTransportFactory;

#[async_trait]
impl TransportFactory for AwsTransportFactory {
    async fn direct(&self, credential: &Credential) -> Result<Session> {
        tracing::debug!(region = %credential.region, "Building S3 session");
        Ok(Arc::new(S3Transport::new(credential).await?))
    }

    async fn external(&self, auth: &HttpAuth) -> Result<Session> {
        Ok(Arc::new(HttpTransport::new(auth)?))
    }
}
