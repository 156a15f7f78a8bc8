use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::source::{Credential, Page, PhotoSource};
use crate::api::{Envelope, ImageDto, LoginRequest, TokenResponse};
use crate::error::{GalleryError, GalleryResult};
use crate::models::{FolderId, Photo, PhotoId};

/// `PhotoSource` backed by the pixfold REST API.
#[derive(Debug, Clone)]
pub struct HttpPhotoSource {
    client: Client,
    base_url: String,
}

impl HttpPhotoSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Exchanges email and password for a bearer credential.
    pub async fn login(&self, email: &str, password: &str) -> GalleryResult<Credential> {
        let response = self
            .client
            .post(self.url("user/login"))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        let body: TokenResponse = decode(response).await?;
        Ok(Credential::bearer(body.token))
    }
}

/// Maps a non-success response to the error taxonomy.
fn status_error(status: StatusCode, message: String) -> GalleryError {
    match status {
        StatusCode::UNAUTHORIZED => GalleryError::Unauthenticated(message),
        StatusCode::FORBIDDEN => GalleryError::Authorization(message),
        StatusCode::NOT_FOUND => GalleryError::NotFound(message),
        StatusCode::BAD_REQUEST => GalleryError::Validation(message),
        StatusCode::CONFLICT => GalleryError::Conflict(message),
        other => GalleryError::Network(format!("{other}: {message}")),
    }
}

async fn check(response: Response) -> GalleryResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| status.to_string());
    Err(status_error(status, message))
}

async fn decode<T: DeserializeOwned>(response: Response) -> GalleryResult<T> {
    let response = check(response).await?;
    Ok(response.json::<T>().await?)
}

#[async_trait]
impl PhotoSource for HttpPhotoSource {
    async fn fetch_page(
        &self,
        credential: &Credential,
        folder: FolderId,
        page: u32,
    ) -> GalleryResult<Page> {
        let response = self
            .client
            .get(self.url(&format!("folder/{folder}/images")))
            .query(&[("page", page)])
            .bearer_auth(credential.token())
            .send()
            .await?;
        let body: Envelope<Vec<ImageDto>> = decode(response).await?;
        let photos = body
            .data
            .into_iter()
            .map(ImageDto::into_photo)
            .collect::<GalleryResult<Vec<_>>>()?;
        debug!(folder, page, count = photos.len(), "fetched page");
        Ok(Page {
            photos,
            has_more: body.has_more.unwrap_or(false),
        })
    }

    async fn upload(
        &self,
        credential: &Credential,
        folder: FolderId,
        bytes: Vec<u8>,
    ) -> GalleryResult<Photo> {
        let form = Form::new().part("image", Part::bytes(bytes).file_name("upload"));
        let response = self
            .client
            .post(self.url(&format!("folder/{folder}/images")))
            .bearer_auth(credential.token())
            .multipart(form)
            .send()
            .await?;
        let body: Envelope<ImageDto> = decode(response).await?;
        body.data.into_photo()
    }

    async fn delete_image(
        &self,
        credential: &Credential,
        folder: FolderId,
        photo: PhotoId,
    ) -> GalleryResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("folder/{folder}/images/{photo}")))
            .bearer_auth(credential.token())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "x".into()),
            GalleryError::Unauthenticated(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, "x".into()),
            GalleryError::Authorization(_)
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "x".into()),
            GalleryError::NotFound(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "x".into()),
            GalleryError::Network(_)
        ));
    }

    #[test]
    fn test_url_joining() {
        let source = HttpPhotoSource::new("http://localhost:8080/");
        assert_eq!(
            source.url("/folder/3/images"),
            "http://localhost:8080/api/folder/3/images"
        );
    }
}
