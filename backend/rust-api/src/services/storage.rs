use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

pub const MAX_IMAGE_BYTES: usize = 2 * 1024 * 1024;
pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Public URL prefix under which stored files are served
pub const PUBLIC_PREFIX: &str = "/uploads";

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores `bytes` under `folder` and returns the public URL
    async fn save(&self, folder: &str, extension: &str, bytes: &[u8]) -> anyhow::Result<String>;
}

pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(&self, folder: &str, extension: &str, bytes: &[u8]) -> anyhow::Result<String> {
        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create upload directory {}", dir.display()))?;

        let file_name = format!("{}.{}", uuid::Uuid::new_v4(), extension);
        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!("Stored upload {}", path.display());
        Ok(format!("{}/{}/{}", PUBLIC_PREFIX, folder, file_name))
    }
}

/// Returns the lower-cased extension of an acceptable image
pub fn validate_image(file_name: &str, size: usize) -> AppResult<String> {
    if size == 0 {
        return Err(AppError::validation_code("INVALID_FILE", "File is empty"));
    }
    if size > MAX_IMAGE_BYTES {
        return Err(AppError::validation_code(
            "FILE_TOO_LARGE",
            "File exceeds the 2 MB limit",
        ));
    }
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ALLOWED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::validation_code(
            "INVALID_FILE",
            format!(
                "Unsupported file type; allowed: {}",
                ALLOWED_IMAGE_EXTENSIONS.join(", ")
            ),
        ));
    }
    Ok(extension)
}

pub async fn store_image(
    storage: &dyn FileStorage,
    folder: &str,
    file_name: &str,
    bytes: &[u8],
) -> AppResult<String> {
    let extension = validate_image(file_name, bytes.len())?;
    Ok(storage.save(folder, &extension, bytes).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_image() {
        assert_eq!(validate_image("me.PNG", 10).unwrap(), "png");
        assert!(validate_image("notes.txt", 10).is_err());
        assert!(validate_image("big.jpg", MAX_IMAGE_BYTES + 1).is_err());
        assert!(validate_image("empty.gif", 0).is_err());
    }

    #[tokio::test]
    async fn test_local_storage_writes_file() {
        let root = std::env::temp_dir().join(format!("ecoquiz-storage-{}", uuid::Uuid::new_v4()));
        let storage = LocalFileStorage::new(&root);

        let url = store_image(&storage, "avatars", "me.png", b"png-bytes")
            .await
            .unwrap();
        assert!(url.starts_with("/uploads/avatars/"));
        assert!(url.ends_with(".png"));

        let file_name = url.rsplit('/').next().unwrap();
        let written = tokio::fs::read(root.join("avatars").join(file_name))
            .await
            .unwrap();
        assert_eq!(written, b"png-bytes");

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
