use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tracing::{debug, info, warn};

use super::access;
use super::auth::{self, AuthUser};
use super::AppState;
use crate::api::{
    image_dto, AccessDto, AddPartnerRequest, Envelope, FolderDto, FolderNameRequest, ImageDto,
    LoginRequest, PageQuery, PartnerAccessRequest, PartnerDto, ProfileDto, RegisterRequest,
    TokenResponse, UpdateProfileRequest,
};
use crate::error::{GalleryError, GalleryResult};
use crate::image_loader;
use crate::models::{Access, Folder, FolderId, PhotoId, UserId, UserUpdate};
use crate::storage;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
        .route("/user", get(profile).put(update_profile))
        .route("/folder", get(owned_folders).post(create_folder))
        .route("/folder/shared", get(shared_folders))
        .route("/folder/shared/{folder}/access", get(folder_access))
        .route("/folder/{folder}", put(rename_folder).delete(delete_folder))
        .route(
            "/folder/{folder}/partners",
            get(list_partners).post(add_partner).delete(clear_partners),
        )
        .route(
            "/folder/{folder}/partners/{pid}",
            put(set_partner_access).delete(remove_partner),
        )
        .route("/folder/{folder}/images", get(list_images).post(upload_image))
        .route("/folder/{folder}/images/{iid}", delete(delete_image));

    Router::new()
        .nest("/api", api)
        .route("/media/{*key}", get(media))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .with_state(state)
}

// =========================================================================
// Users
// =========================================================================

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> GalleryResult<Json<TokenResponse>> {
    auth::validate_password(&req.password)?;
    let hash = hash_off_thread(req.password).await?;
    let user = state
        .store
        .lock()
        .create_user(&req.name, &req.email, &hash)?;
    info!(user = user.id, "registered user");
    token_response(&state, user.id)
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> GalleryResult<Json<TokenResponse>> {
    let user = state
        .store
        .lock()
        .find_user_by_email(&req.email)?
        .ok_or_else(|| GalleryError::Unauthenticated("user not found".to_string()))?;
    let stored = user.password_hash;
    let verified = tokio::task::spawn_blocking(move || auth::verify_password(&req.password, &stored))
        .await
        .map_err(|err| GalleryError::Storage(format!("password task failed: {err}")))?;
    if !verified {
        return Err(GalleryError::Unauthenticated("wrong password".to_string()));
    }
    token_response(&state, user.id)
}

/// Runs Argon2 on the blocking pool.
async fn hash_off_thread(password: String) -> GalleryResult<String> {
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|err| GalleryError::Storage(format!("password task failed: {err}")))?
}

fn token_response(state: &AppState, user: UserId) -> GalleryResult<Json<TokenResponse>> {
    Ok(Json(TokenResponse {
        status: "success".to_string(),
        token: state.tokens.issue(user)?,
    }))
}

async fn profile(State(state): State<AppState>, user: AuthUser) -> GalleryResult<Json<ProfileDto>> {
    let user = state.store.lock().get_user(user.id)?;
    Ok(Json(ProfileDto {
        uid: user.id,
        name: user.name,
        email: user.email,
    }))
}

async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> GalleryResult<Json<Envelope<ProfileDto>>> {
    let password_hash = match req.password {
        Some(password) => {
            auth::validate_password(&password)?;
            Some(hash_off_thread(password).await?)
        }
        None => None,
    };
    let update = UserUpdate {
        name: req.name,
        email: req.email,
        password_hash,
    };
    let user = state.store.lock().update_user(user.id, update)?;
    Ok(Json(Envelope::success(ProfileDto {
        uid: user.id,
        name: user.name,
        email: user.email,
    })))
}

// =========================================================================
// Folders
// =========================================================================

fn folder_list(folders: Vec<Folder>) -> Json<Envelope<Vec<FolderDto>>> {
    Json(Envelope::success(
        folders.into_iter().map(FolderDto::from).collect(),
    ))
}

async fn owned_folders(
    State(state): State<AppState>,
    user: AuthUser,
) -> GalleryResult<Json<Envelope<Vec<FolderDto>>>> {
    let folders = state.store.lock().list_owned_folders(user.id)?;
    Ok(folder_list(folders))
}

async fn shared_folders(
    State(state): State<AppState>,
    user: AuthUser,
) -> GalleryResult<Json<Envelope<Vec<FolderDto>>>> {
    let folders = state.store.lock().list_shared_folders(user.id)?;
    Ok(folder_list(folders))
}

fn required_name(req: FolderNameRequest) -> GalleryResult<String> {
    req.name
        .ok_or_else(|| GalleryError::Validation("folder name is required".to_string()))
}

async fn create_folder(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<FolderNameRequest>,
) -> GalleryResult<(StatusCode, Json<Envelope<FolderDto>>)> {
    let name = required_name(req)?;
    let folder = state.store.lock().create_folder(user.id, &name)?;
    Ok((StatusCode::CREATED, Json(Envelope::success(folder.into()))))
}

async fn rename_folder(
    State(state): State<AppState>,
    user: AuthUser,
    Path(folder_id): Path<FolderId>,
    Json(req): Json<FolderNameRequest>,
) -> GalleryResult<Json<Envelope<FolderDto>>> {
    let name = required_name(req)?;
    let store = state.store.lock();
    let folder = store.get_folder(folder_id)?;
    access::require_owner(&folder, user.id)?;
    let folder = store.rename_folder(folder_id, &name)?;
    Ok(Json(Envelope::success(folder.into())))
}

/// Deletes the folder rows first, then its stored objects.
async fn delete_folder(
    State(state): State<AppState>,
    user: AuthUser,
    Path(folder_id): Path<FolderId>,
) -> GalleryResult<Json<Envelope<FolderDto>>> {
    let folder = {
        let store = state.store.lock();
        let folder = store.get_folder(folder_id)?;
        access::require_owner(&folder, user.id)?;
        store.delete_folder(folder_id)?;
        folder
    };

    for prefix in storage::folder_prefixes(folder_id) {
        match state.storage.delete_prefix(&prefix).await {
            Ok(removed) => debug!(folder = folder_id, %prefix, removed, "removed folder objects"),
            Err(err) => warn!(folder = folder_id, %prefix, error = %err, "failed to remove folder objects"),
        }
    }
    info!(folder = folder_id, "deleted folder");
    Ok(Json(Envelope::success(folder.into())))
}

async fn folder_access(
    State(state): State<AppState>,
    user: AuthUser,
    Path(folder_id): Path<FolderId>,
) -> GalleryResult<Json<Envelope<AccessDto>>> {
    let folder = state.store.lock().get_folder(folder_id)?;
    let access = access::access_of(&folder, user.id).ok_or_else(|| {
        GalleryError::Authorization(format!("folder {folder_id} is not shared with you"))
    })?;
    Ok(Json(Envelope::success(AccessDto {
        access: access.as_u8(),
    })))
}

// =========================================================================
// Partners
// =========================================================================

async fn list_partners(
    State(state): State<AppState>,
    user: AuthUser,
    Path(folder_id): Path<FolderId>,
) -> GalleryResult<Json<Envelope<Vec<PartnerDto>>>> {
    let folder = state.store.lock().get_folder(folder_id)?;
    access::require_owner(&folder, user.id)?;
    Ok(Json(Envelope::success(
        folder.partners.into_iter().map(PartnerDto::from).collect(),
    )))
}

async fn add_partner(
    State(state): State<AppState>,
    user: AuthUser,
    Path(folder_id): Path<FolderId>,
    Json(req): Json<AddPartnerRequest>,
) -> GalleryResult<Json<Envelope<FolderDto>>> {
    let email = req
        .partner
        .ok_or_else(|| GalleryError::Validation("partner email is required".to_string()))?;
    let access = Access::from_i64(req.access.unwrap_or(0))?;

    let store = state.store.lock();
    let folder = store.get_folder(folder_id)?;
    access::require_owner(&folder, user.id)?;
    let folder = store.add_partner(folder_id, &email, access)?;
    Ok(Json(Envelope::success(folder.into())))
}

async fn set_partner_access(
    State(state): State<AppState>,
    user: AuthUser,
    Path((folder_id, partner)): Path<(FolderId, UserId)>,
    Json(req): Json<PartnerAccessRequest>,
) -> GalleryResult<Json<Envelope<FolderDto>>> {
    access::validate_partner(user.id, partner)?;
    let access = req
        .access
        .ok_or_else(|| GalleryError::Validation("access is required".to_string()))
        .and_then(Access::from_i64)?;

    let store = state.store.lock();
    let folder = store.get_folder(folder_id)?;
    access::require_owner(&folder, user.id)?;
    let folder = store.set_partner_access(folder_id, partner, access)?;
    Ok(Json(Envelope::success(folder.into())))
}

async fn remove_partner(
    State(state): State<AppState>,
    user: AuthUser,
    Path((folder_id, partner)): Path<(FolderId, UserId)>,
) -> GalleryResult<Json<Envelope<FolderDto>>> {
    access::validate_partner(user.id, partner)?;
    let store = state.store.lock();
    let folder = store.get_folder(folder_id)?;
    access::require_owner(&folder, user.id)?;
    let folder = store.remove_partner(folder_id, partner)?;
    Ok(Json(Envelope::success(folder.into())))
}

async fn clear_partners(
    State(state): State<AppState>,
    user: AuthUser,
    Path(folder_id): Path<FolderId>,
) -> GalleryResult<Json<Envelope<FolderDto>>> {
    let store = state.store.lock();
    let folder = store.get_folder(folder_id)?;
    access::require_owner(&folder, user.id)?;
    let folder = store.clear_partners(folder_id)?;
    Ok(Json(Envelope::success(folder.into())))
}

// =========================================================================
// Images
// =========================================================================

async fn list_images(
    State(state): State<AppState>,
    user: AuthUser,
    Path(folder_id): Path<FolderId>,
    Query(query): Query<PageQuery>,
) -> GalleryResult<Json<Envelope<Vec<ImageDto>>>> {
    let page = query.page.unwrap_or(1);
    if page == 0 {
        return Err(GalleryError::Validation("page numbers start at 1".to_string()));
    }

    let (records, has_more) = {
        let store = state.store.lock();
        let folder = store.get_folder(folder_id)?;
        access::require_read(&folder, user.id)?;
        store.list_images(folder_id, page, state.page_size)?
    };

    let images = records
        .iter()
        .map(|record| image_dto(record, |key| state.storage.url(key)))
        .collect();
    Ok(Json(Envelope::page(images, has_more)))
}

async fn read_image_field(multipart: &mut Multipart) -> GalleryResult<Vec<u8>> {
    let invalid = |err: axum::extract::multipart::MultipartError| {
        GalleryError::Validation(format!("malformed upload: {err}"))
    };
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() == Some("image") {
            let bytes = field.bytes().await.map_err(invalid)?;
            if bytes.is_empty() {
                return Err(GalleryError::Validation("uploaded image is empty".to_string()));
            }
            return Ok(bytes.to_vec());
        }
    }
    Err(GalleryError::Validation("missing `image` field".to_string()))
}

/// Best-effort cleanup of objects written by a failed upload.
async fn discard(state: &AppState, keys: &[&str]) {
    for key in keys {
        if let Err(err) = state.storage.delete(key).await {
            warn!(key, error = %err, "failed to discard object");
        }
    }
}

/// Stores the original and its thumbnail, then records them. All or nothing.
async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(folder_id): Path<FolderId>,
    mut multipart: Multipart,
) -> GalleryResult<(StatusCode, Json<Envelope<ImageDto>>)> {
    {
        let store = state.store.lock();
        let folder = store.get_folder(folder_id)?;
        access::require_write(&folder, user.id)?;
    }

    let bytes = read_image_field(&mut multipart).await?;
    let format = image_loader::detect_format(&bytes)?;

    let generator = state.thumbnails;
    let (thumb, bytes) = tokio::task::spawn_blocking(move || {
        generator.generate(&bytes).map(|thumb| (thumb, bytes))
    })
    .await
    .map_err(|err| GalleryError::Storage(format!("thumbnail task failed: {err}")))??;

    let (thumb_w, thumb_h) = (thumb.width, thumb.height);
    let object_key = storage::image_key(folder_id, image_loader::extension_for(format));
    let thumb_key = storage::thumb_key(folder_id);

    state.storage.put(&object_key, bytes).await?;
    if let Err(err) = state.storage.put(&thumb_key, thumb.jpeg).await {
        discard(&state, &[&object_key]).await;
        return Err(err);
    }

    let inserted = state.store.lock().insert_image(
        folder_id,
        &object_key,
        &thumb_key,
        thumb.source_width,
        thumb.source_height,
    );
    let record = match inserted {
        Ok(record) => record,
        Err(err) => {
            discard(&state, &[&object_key, &thumb_key]).await;
            return Err(err);
        }
    };

    info!(
        folder = folder_id,
        image = record.id,
        thumb_w = thumb_w,
        thumb_h = thumb_h,
        "uploaded image"
    );
    let dto = image_dto(&record, |key| state.storage.url(key));
    Ok((StatusCode::CREATED, Json(Envelope::success(dto))))
}

async fn delete_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path((folder_id, image_id)): Path<(FolderId, PhotoId)>,
) -> GalleryResult<Json<Envelope<ImageDto>>> {
    let record = {
        let store = state.store.lock();
        let folder = store.get_folder(folder_id)?;
        access::require_write(&folder, user.id)?;
        let record = store.get_image(image_id)?;
        if record.folder_id != folder_id {
            return Err(GalleryError::NotFound(format!(
                "image {image_id} in folder {folder_id}"
            )));
        }
        store.delete_image(image_id)?
    };

    let dto = image_dto(&record, |key| state.storage.url(key));
    discard(&state, &[&record.object_key, &record.thumb_key]).await;
    info!(folder = folder_id, image = image_id, "deleted image");
    Ok(Json(Envelope::success(dto)))
}

// =========================================================================
// Media
// =========================================================================

fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default().to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

async fn media(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> GalleryResult<impl IntoResponse> {
    let bytes = state.storage.get(&key).await?;
    Ok(([(CONTENT_TYPE, content_type_for(&key))], bytes))
}
