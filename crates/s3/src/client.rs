//! Direct-access S3 transport
//!
//! Wraps aws-sdk-s3 and implements the ObjectTransport trait from ef-core
//! using temporary credentials issued for one scope.

use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_smithy_types::error::display::DisplayErrorContext;
use tokio::io::AsyncWriteExt;

use ef_core::{AccessMethod, Credential, Error, ObjectTransport, Result};

/// S3 client authenticated with a temporary credential
pub struct S3Transport {
    inner: aws_sdk_s3::Client,
}

impl S3Transport {
    /// Create a client from a temporary credential
    pub async fn new(credential: &Credential) -> Result<Self> {
        let credentials = aws_credential_types::Credentials::new(
            credential.access_key_id.clone(),
            credential.secret_access_key.clone(),
            Some(credential.session_token.clone()),
            Some(SystemTime::from(credential.expires_at)),
            "earthfetch-temporary",
        );

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_config::Region::new(credential.region.clone()))
            .load()
            .await;

        Ok(Self {
            inner: aws_sdk_s3::Client::new(&config),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.inner
    }

    async fn get(
        &self,
        url: &str,
        range: Option<String>,
    ) -> Result<aws_sdk_s3::operation::get_object::GetObjectOutput> {
        let (bucket, key) = parse_s3_url(url)?;
        self.inner
            .get_object()
            .bucket(bucket)
            .key(key)
            .set_range(range)
            .send()
            .await
            .map_err(|e| map_sdk_error(url, &DisplayErrorContext(&e).to_string()))
    }
}

/// Split `s3://bucket/key` into its parts
pub fn parse_s3_url(url: &str) -> Result<(&str, &str)> {
    let rest = url
        .strip_prefix("s3://")
        .ok_or_else(|| Error::InvalidInput(format!("Not an s3:// link: {url}")))?;
    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(Error::InvalidInput(format!(
            "s3:// link needs a bucket and a key: {url}"
        ))),
    }
}

/// Inclusive HTTP range header for `len` bytes at `offset`
pub(crate) fn range_header(offset: u64, len: u64) -> String {
    format!("bytes={}-{}", offset, offset + len - 1)
}

fn map_sdk_error(url: &str, err_str: &str) -> Error {
    if err_str.contains("NotFound") || err_str.contains("NoSuchKey") || err_str.contains("NoSuchBucket") {
        Error::NotFound(url.to_string())
    } else if err_str.contains("AccessDenied")
        || err_str.contains("Forbidden")
        || err_str.contains("ExpiredToken")
        || err_str.contains("InvalidAccessKeyId")
    {
        Error::Auth(format!("{url}: {err_str}"))
    } else if err_str.contains("InvalidRange") {
        Error::InvalidInput(format!("{url}: {err_str}"))
    } else {
        Error::Network(err_str.to_string())
    }
}

#[async_trait]
impl ObjectTransport for S3Transport {
    fn method(&self) -> AccessMethod {
        AccessMethod::Direct
    }

    async fn read_range(&self, url: &str, offset: u64, len: u64) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let response = self.get(url, Some(range_header(offset, len))).await?;
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(e.to_string()))?
            .into_bytes()
            .to_vec();
        Ok(data)
    }

    async fn size(&self, url: &str) -> Result<u64> {
        let (bucket, key) = parse_s3_url(url)?;
        let response = self
            .inner
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(url, &DisplayErrorContext(&e).to_string()))?;
        Ok(response.content_length().unwrap_or(0).max(0) as u64)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.get(url, None).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = response.body.next().await {
            let chunk = chunk.map_err(|e| Error::Network(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(url, bytes = written, "S3 download complete");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_url() {
        let (bucket, key) = parse_s3_url("s3://podaac-ops/SST/granule.nc").unwrap();
        assert_eq!(bucket, "podaac-ops");
        assert_eq!(key, "SST/granule.nc");

        assert!(parse_s3_url("https://host/a").is_err());
        assert!(parse_s3_url("s3://bucket-only").is_err());
        assert!(parse_s3_url("s3:///key").is_err());
    }

    #[test]
    fn test_range_header_is_inclusive() {
        assert_eq!(range_header(0, 10), "bytes=0-9");
        assert_eq!(range_header(100, 1), "bytes=100-100");
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_sdk_error("s3://b/k", "service error: NoSuchKey"),
            Error::NotFound(_)
        ));
        assert!(matches!(
            map_sdk_error("s3://b/k", "AccessDenied: Access Denied"),
            Error::Auth(_)
        ));
        let err = map_sdk_error("s3://b/k", "dispatch failure: connection reset");
        assert!(err.is_retryable());
    }
}
