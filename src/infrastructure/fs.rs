use crate::domain::ports::ArtifactStore;
use crate::error::{AuthorizerError, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Artifact store writing each key as a file below a base directory.
///
/// The content type is not persisted; keys carry their extension.
pub struct FsArtifactStore {
    base_path: PathBuf,
}

impl FsArtifactStore {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(AuthorizerError::Artifact(
                format!("invalid artifact key '{key}'").into(),
            ));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AuthorizerError::Artifact(Box::new(e)))?;
        }
        fs::write(&path, body)
            .await
            .map_err(|e| AuthorizerError::Artifact(Box::new(e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_creates_nested_directories() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("artifacts")).await.unwrap();

        store
            .put("1790011223001/authorized/KEY.xml", b"<xml/>".to_vec(), "application/xml")
            .await
            .unwrap();
        store
            .put("1790011223001/authorized/KEY.xml", b"<xml/>".to_vec(), "application/xml")
            .await
            .unwrap();

        let written =
            std::fs::read(dir.path().join("artifacts/1790011223001/authorized/KEY.xml")).unwrap();
        assert_eq!(written, b"<xml/>");
    }

    #[tokio::test]
    async fn test_rejects_keys_escaping_base() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).await.unwrap();

        for key in ["../outside.xml", "/etc/passwd", ""] {
            assert!(matches!(
                store.put(key, Vec::new(), "application/xml").await,
                Err(AuthorizerError::Artifact(_))
            ));
        }
    }
}
