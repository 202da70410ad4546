//! Read handles for opened objects

use std::io::SeekFrom;

use crate::error::{Error, Result};
use crate::resolver::AccessMethod;
use crate::traits::Session;
use crate::transfer::OpenedObject;

/// Random-access reader over one remote object.
///
/// Each `read` issues one ranged request through the session; nothing is
/// buffered locally.
pub struct ObjectStream {
    session: Option<Session>,
    url: String,
    method: AccessMethod,
    size: u64,
    position: u64,
    record_id: Option<String>,
}

impl ObjectStream {
    pub fn new(session: Session, opened: OpenedObject) -> Self {
        Self {
            session: Some(session),
            url: opened.url,
            method: opened.method,
            size: opened.size,
            position: 0,
            record_id: opened.record_id,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> AccessMethod {
        self.method
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Id of the record the object came from
    pub fn record_id(&self) -> Option<&str> {
        self.record_id.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    /// Read up to `len` bytes from the current position; empty at end of object
    pub async fn read(&mut self, len: u64) -> Result<Vec<u8>> {
        let session = self.session()?;
        let len = len.min(self.size.saturating_sub(self.position));
        if len == 0 {
            return Ok(Vec::new());
        }
        let bytes = session.read_range(&self.url, self.position, len).await?;
        self.position += bytes.len() as u64;
        Ok(bytes)
    }

    /// Read from the current position to the end
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let remaining = self.size.saturating_sub(self.position);
        self.read(remaining).await
    }

    /// Move the read position; positions past the end are clamped
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.session()?;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            Error::InvalidInput(format!("seek before start of {}", self.url))
        })?;
        self.position = target.min(self.size);
        Ok(self.position)
    }

    /// Release the session; later reads fail
    pub fn close(&mut self) {
        self.session = None;
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::General(format!("stream for {} is closed", self.url)))
    }
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("size", &self.size)
            .field("position", &self.position)
            .field("record_id", &self.record_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
