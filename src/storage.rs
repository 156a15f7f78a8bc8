//! Object storage for original images and thumbnails.
//!
//! Keys are slash-separated relative paths:
//! - `images/<folder>/<random>.<ext>` for originals
//! - `thumbs/<folder>/<random>.jpg` for thumbnails

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{GalleryError, GalleryResult};
use crate::models::FolderId;

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> GalleryResult<()>;

    /// Reads an object back. Missing objects are `NotFound`.
    async fn get(&self, key: &str) -> GalleryResult<Vec<u8>>;

    /// Removes one object. Missing objects are not an error.
    async fn delete(&self, key: &str) -> GalleryResult<()>;

    /// Removes every object under `prefix` and returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> GalleryResult<usize>;

    /// Public URL for a key.
    fn url(&self, key: &str) -> String;
}

fn random_name() -> String {
    format!("{:016x}", rand::rng().random::<u64>())
}

pub fn image_key(folder: FolderId, extension: &str) -> String {
    format!("images/{folder}/{}.{extension}", random_name())
}

pub fn thumb_key(folder: FolderId) -> String {
    format!("thumbs/{folder}/{}.jpg", random_name())
}

/// Every prefix that holds objects belonging to `folder`.
pub fn folder_prefixes(folder: FolderId) -> [String; 2] {
    [format!("images/{folder}/"), format!("thumbs/{folder}/")]
}

/// Stores objects as files below a root directory; served by the `/media` route.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Maps a key to a path below the root, rejecting anything that could escape it.
    pub fn resolve(&self, key: &str) -> GalleryResult<PathBuf> {
        let relative = Path::new(key.trim_end_matches('/'));
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(GalleryError::Validation(format!("invalid object key {key:?}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> GalleryResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(key, "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> GalleryResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(GalleryError::NotFound(format!("object {key}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key: &str) -> GalleryResult<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(key, "object already gone");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> GalleryResult<usize> {
        let dir = self.resolve(prefix)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        tokio::fs::remove_dir_all(&dir).await?;
        debug!(prefix, removed, "deleted objects under prefix");
        Ok(removed)
    }

    fn url(&self, key: &str) -> String {
        format!("{}/media/{}", self.public_base, key)
    }
}
