use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::StorageError;
use crate::ports::ObjectStore;

/// Filesystem-backed object store.
///
/// Objects land under `root/<key>`; the returned URL is a `file://` path.
/// Production deployments swap this for an S3-compatible adapter behind the
/// same port.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("file://{}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_writes_bytes_and_returns_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        let url = store
            .put("documents/abc_scan.pdf", b"%PDF-", "application/octet-stream")
            .await
            .unwrap();

        assert!(url.starts_with("file://"));
        let stored = tokio::fs::read(dir.path().join("documents/abc_scan.pdf"))
            .await
            .unwrap();
        assert_eq!(stored, b"%PDF-");
    }
}
