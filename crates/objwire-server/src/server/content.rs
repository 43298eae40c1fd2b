//! Access to the served snapshot.
//!
//! [`ContentSource`] is injected into every endpoint. In eager mode the
//! snapshot is loaded before any listener is bound, so a missing file aborts
//! startup. In lazy mode the first request triggers the load; failures are
//! reported per request as [`Error::ContentUnavailable`] and the load is
//! attempted again on the next request until it succeeds once.

use objwire_core::{Error, ObjectSnapshot, Result};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::OnceCell;

#[derive(Clone, Debug)]
pub struct ContentSource {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    snapshot: OnceCell<Arc<ObjectSnapshot>>,
}

impl ContentSource {
    /// Loads `path` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StartupIo`] if the file cannot be read.
    pub async fn eager(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = ObjectSnapshot::load(&path).await?;
        Ok(Self {
            inner: Arc::new(Inner {
                path,
                snapshot: OnceCell::new_with(Some(Arc::new(snapshot))),
            }),
        })
    }

    /// Defers loading `path` until the first call to [`snapshot`].
    ///
    /// [`snapshot`]: ContentSource::snapshot
    pub fn lazy(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: path.into(),
                snapshot: OnceCell::new(),
            }),
        }
    }

    /// Wraps an already built snapshot.
    pub fn from_snapshot(snapshot: ObjectSnapshot) -> Self {
        Self {
            inner: Arc::new(Inner {
                path: PathBuf::new(),
                snapshot: OnceCell::new_with(Some(Arc::new(snapshot))),
            }),
        }
    }

    /// Returns the shared snapshot, loading it first in lazy mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContentUnavailable`] if the lazy load fails.
    pub async fn snapshot(&self) -> Result<Arc<ObjectSnapshot>> {
        self.inner
            .snapshot
            .get_or_try_init(|| async {
                let snapshot = ObjectSnapshot::load(&self.inner.path).await.map_err(|e| {
                    tracing::warn!(path = %self.inner.path.display(), "Content load failed: {e}");
                    Error::ContentUnavailable {
                        reason: e.to_string(),
                    }
                })?;
                tracing::info!(
                    path = %self.inner.path.display(),
                    bytes = snapshot.len(),
                    fingerprint = snapshot.fingerprint(),
                    "Content loaded on first access"
                );
                Ok::<_, Error>(Arc::new(snapshot))
            })
            .await
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.snapshot.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn eager_source_fails_fast_on_missing_file() {
        let err = ContentSource::eager("/no/such/content")
            .await
            .expect_err("missing file must abort startup");
        assert!(matches!(err, Error::StartupIo { .. }));
    }

    #[tokio::test]
    async fn lazy_source_reports_unavailable_until_file_appears() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("content_data");
        let source = ContentSource::lazy(&path);

        let err = source.snapshot().await.expect_err("file does not exist yet");
        assert!(matches!(err, Error::ContentUnavailable { .. }));
        assert!(!source.is_loaded());

        std::fs::File::create(&path)
            .and_then(|mut f| f.write_all(b"late content"))
            .expect("write content");

        let first = source.snapshot().await?;
        let second = source.snapshot().await?;
        assert_eq!(first.content().as_ref(), b"late content");
        assert!(Arc::ptr_eq(&first, &second));
        Ok(())
    }
}
