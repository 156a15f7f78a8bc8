//! JSON shapes exchanged between the HTTP client and the server.

use serde::{Deserialize, Serialize};

use crate::error::GalleryResult;
use crate::models::{Folder, FolderId, ImageRecord, Partner, Photo, PhotoId, UserId};

/// `{status: "success", data, has_more?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data,
            has_more: None,
        }
    }

    pub fn page(data: T, has_more: bool) -> Self {
        Self {
            status: "success".to_string(),
            data,
            has_more: Some(has_more),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDto {
    pub id: PhotoId,
    /// Full-size image URL.
    pub path: String,
    pub thumb: String,
    pub width: u32,
    pub height: u32,
}

impl ImageDto {
    pub fn into_photo(self) -> GalleryResult<Photo> {
        Photo::new(self.id, self.path, self.thumb, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerDto {
    pub user: UserId,
    pub name: String,
    pub email: String,
    pub access: u8,
}

impl From<Partner> for PartnerDto {
    fn from(p: Partner) -> Self {
        Self {
            user: p.user_id,
            name: p.name,
            email: p.email,
            access: p.access.as_u8(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDto {
    pub id: FolderId,
    pub name: String,
    pub owner: UserId,
    pub partners: Vec<PartnerDto>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Folder> for FolderDto {
    fn from(f: Folder) -> Self {
        Self {
            id: f.id,
            name: f.name,
            owner: f.owner,
            partners: f.partners.into_iter().map(PartnerDto::from).collect(),
            created_at: f.created_at,
            updated_at: f.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub status: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDto {
    pub uid: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDto {
    pub access: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderNameRequest {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPartnerRequest {
    /// Partner's email address.
    pub partner: Option<String>,
    pub access: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerAccessRequest {
    pub access: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// Builds the wire shape for a stored image, resolving object keys to URLs.
pub fn image_dto(record: &ImageRecord, url_for: impl Fn(&str) -> String) -> ImageDto {
    ImageDto {
        id: record.id,
        path: url_for(&record.object_key),
        thumb: url_for(&record.thumb_key),
        width: record.width,
        height: record.height,
    }
}
