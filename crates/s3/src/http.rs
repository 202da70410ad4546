//! HTTPS fallback transport
//!
//! Reads objects through their `https://` links with an Earthdata Login
//! bearer token, extra headers and cookies. Works from any network location.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_RANGE, COOKIE, RANGE};
use reqwest::{Client, StatusCode};
use tokio::io::AsyncWriteExt;

use ef_core::{AccessMethod, Error, HttpAuth, ObjectTransport, Result};

use crate::client::range_header;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated HTTPS client
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(auth: &HttpAuth) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .default_headers(default_headers(auth)?)
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str, range: Option<String>) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }
        let response = request.send().await.map_err(map_request_error)?;
        check_status(url, response.status())?;
        Ok(response)
    }
}

fn default_headers(auth: &HttpAuth) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in auth.request_headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Auth(format!("Invalid header name {name}: {e}")))?;
        let mut value = HeaderValue::from_str(&value)
            .map_err(|e| Error::Auth(format!("Invalid value for header {name}: {e}")))?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }
    if let Some(cookies) = auth.cookie_header() {
        let mut value = HeaderValue::from_str(&cookies)
            .map_err(|e| Error::Auth(format!("Invalid cookie value: {e}")))?;
        value.set_sensitive(true);
        headers.insert(COOKIE, value);
    }
    Ok(headers)
}

fn map_request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Network(e.to_string())
    }
}

/// Map an HTTP status onto the error taxonomy
pub(crate) fn check_status(url: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Error::NotFound(url.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Auth(format!("{url}: HTTP {status}"))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Error::Network(format!("{url}: HTTP {status}"))
        }
        s if s.is_server_error() => Error::Network(format!("{url}: HTTP {status}")),
        _ => Error::General(format!("{url}: HTTP {status}")),
    })
}

/// Total length from a `Content-Range: bytes 0-0/1234` header
pub(crate) fn total_from_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl ObjectTransport for HttpTransport {
    fn method(&self) -> AccessMethod {
        AccessMethod::External
    }

    async fn read_range(&self, url: &str, offset: u64, len: u64) -> Result<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let response = self.get(url, Some(range_header(offset, len))).await?;
        let ranged = response.status() == StatusCode::PARTIAL_CONTENT;
        let body = response.bytes().await.map_err(map_request_error)?;

        if ranged {
            return Ok(body.to_vec());
        }
        // Server ignored the range and sent the whole object.
        let start = (offset as usize).min(body.len());
        let end = start.saturating_add(len as usize).min(body.len());
        Ok(body[start..end].to_vec())
    }

    async fn size(&self, url: &str) -> Result<u64> {
        let head = self.client.head(url).send().await.map_err(map_request_error)?;
        if head.status().is_success()
            && let Some(length) = head.content_length()
            && length > 0
        {
            return Ok(length);
        }

        // Some archives refuse HEAD; a one-byte range reports the total instead.
        let response = self.get(url, Some(range_header(0, 1))).await?;
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(total_from_content_range)
            .or_else(|| response.content_length());
        total.ok_or_else(|| Error::General(format!("{url}: server did not report a size")))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.get(url, None).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_request_error)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(url, bytes = written, "HTTPS download complete");
        Ok(written)
    }
}
