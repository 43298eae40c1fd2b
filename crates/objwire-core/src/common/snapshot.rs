//! The immutable object served by every endpoint.
//!
//! An [`ObjectSnapshot`] is built once from the backing file and never
//! mutated. Handlers hold it behind an `Arc`; responses borrow its content as
//! a cheap `Bytes` clone, so every response within one server lifetime is
//! byte-identical and carries the same fingerprint and mtime.

use crate::{
    Error, Result,
    proto::ObjectResponse,
    types::MEDIA_TYPE,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::{path::Path, time::SystemTime};

/// `strftime` pattern for an IMF-fixdate (RFC 9110 HTTP-date).
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSnapshot {
    content: Bytes,
    fingerprint: String,
    mtime: String,
}

impl ObjectSnapshot {
    /// Reads `path` into memory and derives its fingerprint and mtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StartupIo`] if the file cannot be opened, read or
    /// stat'ed. No partial snapshot is ever produced.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let startup_io = |source| Error::StartupIo {
            path: path.to_path_buf(),
            source,
        };

        let modified = tokio::fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .map_err(startup_io)?;
        let content = tokio::fs::read(path).await.map_err(startup_io)?;

        Ok(Self::from_parts(content, modified))
    }

    /// Builds a snapshot from in-memory content.
    pub fn from_parts(content: impl Into<Bytes>, modified: SystemTime) -> Self {
        let content = content.into();
        Self {
            fingerprint: fingerprint(&content),
            mtime: http_date(modified),
            content,
        }
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn mtime(&self) -> &str {
        &self.mtime
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Builds a fresh response that shares this snapshot's content.
    pub fn to_response(&self) -> ObjectResponse {
        ObjectResponse {
            media_type: MEDIA_TYPE.to_string(),
            mtime: self.mtime.clone(),
            fingerprint: self.fingerprint.clone(),
            content: self.content.clone(),
        }
    }
}

/// Hex-encoded MD5 digest of `content`.
pub fn fingerprint(content: &[u8]) -> String {
    hex::encode(Md5::digest(content))
}

/// Formats `time` as an HTTP-date, always in GMT.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE_FORMAT).to_string()
}
