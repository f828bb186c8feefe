//! Blob storage behind a narrow trait.
//!
//! The shipped implementation writes to the local filesystem under a
//! configured root. Keys are forward-slash paths generated internally
//! (for example `covers/<digest>.jpg`).

use std::path::{Component, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStoreTrait: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> anyhow::Result<()>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>>;
}

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = PathBuf::from(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || key.is_empty() {
            anyhow::bail!("invalid blob key: {key:?}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStoreTrait for FsBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> FsBlobStore {
        let root = std::env::temp_dir().join(format!("satchel-blobs-{}", Uuid::new_v4()));
        FsBlobStore::new(root)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let store = temp_store();
        store
            .put("covers/abc123.jpg", Bytes::from_static(b"fake image"), "image/jpeg")
            .await
            .unwrap();

        let got = store.get("covers/abc123.jpg").await.unwrap();
        assert_eq!(got, Some(Bytes::from_static(b"fake image")));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let store = temp_store();
        assert_eq!(store.get("covers/never-written.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_traversal_keys_are_rejected() {
        let store = temp_store();
        let err = store
            .put("../outside.bin", Bytes::from_static(b"x"), "application/octet-stream")
            .await;
        assert!(err.is_err());
        assert!(store.get("/etc/hostname").await.is_err());
    }
}
