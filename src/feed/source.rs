use std::fmt;

use async_trait::async_trait;

use crate::error::GalleryResult;
use crate::models::{FolderId, Photo, PhotoId};

/// Bearer token handed explicitly to every backend call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// One page of photos.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub photos: Vec<Photo>,
    pub has_more: bool,
}

/// Backend operations the feed depends on.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    /// Fetches page `page` (1-based) of a folder.
    async fn fetch_page(
        &self,
        credential: &Credential,
        folder: FolderId,
        page: u32,
    ) -> GalleryResult<Page>;

    /// Uploads raw image bytes; the backend creates image and thumbnail or nothing.
    async fn upload(
        &self,
        credential: &Credential,
        folder: FolderId,
        bytes: Vec<u8>,
    ) -> GalleryResult<Photo>;

    async fn delete_image(
        &self,
        credential: &Credential,
        folder: FolderId,
        photo: PhotoId,
    ) -> GalleryResult<()>;
}
