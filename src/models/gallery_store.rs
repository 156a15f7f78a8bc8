//! SQLite-backed metadata for users, folders, folder partners and images.
//!
//! Stored objects themselves (image bytes, thumbnails) live in
//! [`ObjectStorage`](crate::storage::ObjectStorage); rows here only hold their keys.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::error::{GalleryError, GalleryResult};
use crate::models::PhotoId;

pub type UserId = i64;
pub type FolderId = i64;

/// Images per page when listing a folder.
pub const IMAGE_PAGE_SIZE: u32 = 30;

/// Longest accepted folder name, in characters.
const MAX_FOLDER_NAME: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub created_at: i64,
}

/// Partner access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// View only.
    Read,
    /// View, upload and delete.
    Write,
}

impl Access {
    pub fn as_u8(self) -> u8 {
        match self {
            Access::Read => 0,
            Access::Write => 1,
        }
    }

    pub fn from_i64(value: i64) -> GalleryResult<Self> {
        match value {
            0 => Ok(Access::Read),
            1 => Ok(Access::Write),
            other => Err(GalleryError::Validation(format!(
                "access level must be 0 or 1, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partner {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub access: Access,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub owner: UserId,
    pub partners: Vec<Partner>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Folder {
    pub fn partner(&self, user: UserId) -> Option<&Partner> {
        self.partners.iter().find(|p| p.user_id == user)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: PhotoId,
    pub folder_id: FolderId,
    pub object_key: String,
    pub thumb_key: String,
    pub width: u32,
    pub height: u32,
    pub created_at: i64,
}

/// Field changes for [`GalleryStore::update_user`]; `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    /// New password hash.
    pub password_hash: Option<String>,
}

pub struct GalleryStore {
    conn: Connection,
}

impl GalleryStore {
    /// Opens or creates the database at the specified path.
    ///
    /// Uses WAL journaling with foreign keys enforced, so deleting a folder
    /// cascades to its partners and images.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA cache_size = -64000;
            PRAGMA foreign_keys = ON;
            ",
        )
        .context("Failed to configure SQLite pragmas")?;

        let store = Self { conn };
        store.create_tables()?;

        info!("Opened gallery store at {:?}", path);
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                owner INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (owner) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_folders_owner ON folders(owner);

            CREATE TABLE IF NOT EXISTS partners (
                folder_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                access INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (folder_id, user_id),
                FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_partners_user ON partners(user_id);

            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                folder_id INTEGER NOT NULL,
                object_key TEXT NOT NULL UNIQUE,
                thumb_key TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_images_folder ON images(folder_id, created_at);
            ",
            )
            .context("Failed to create database tables")?;

        debug!("Database tables created/verified");
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> GalleryResult<User> {
        let name = validate_user_name(name)?;
        let email = validate_email(email)?;
        if self.find_user_by_email(&email)?.is_some() {
            return Err(GalleryError::Conflict(format!(
                "email {email} is already registered"
            )));
        }

        self.conn.execute(
            "INSERT INTO users (name, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, email, password_hash, Self::now()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(user = id, "created user");
        self.get_user(id)
    }

    pub fn find_user_by_email(&self, email: &str) -> GalleryResult<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, name, email, password_hash, created_at
                 FROM users WHERE email = ?1",
                params![email.trim().to_lowercase()],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user(&self, id: UserId) -> GalleryResult<User> {
        self.conn
            .query_row(
                "SELECT id, name, email, password_hash, created_at
                 FROM users WHERE id = ?1",
                params![id],
                user_from_row,
            )
            .optional()?
            .ok_or_else(|| GalleryError::NotFound(format!("user {id}")))
    }

    pub fn update_user(&self, id: UserId, update: UserUpdate) -> GalleryResult<User> {
        let current = self.get_user(id)?;

        let name = match update.name {
            Some(name) => validate_user_name(&name)?,
            None => current.name,
        };
        let email = match update.email {
            Some(email) => {
                let email = validate_email(&email)?;
                if let Some(other) = self.find_user_by_email(&email)? {
                    if other.id != id {
                        return Err(GalleryError::Conflict(format!(
                            "email {email} is already registered"
                        )));
                    }
                }
                email
            }
            None => current.email,
        };
        let password_hash = update.password_hash.unwrap_or(current.password_hash);

        self.conn.execute(
            "UPDATE users SET name = ?1, email = ?2, password_hash = ?3 WHERE id = ?4",
            params![name, email, password_hash, id],
        )?;
        self.get_user(id)
    }

    // =========================================================================
    // Folders
    // =========================================================================

    pub fn create_folder(&self, owner: UserId, name: &str) -> GalleryResult<Folder> {
        let name = validate_folder_name(name)?;
        let now = Self::now();
        self.conn.execute(
            "INSERT INTO folders (name, owner, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, owner, now],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(folder = id, owner, "created folder");
        self.get_folder(id)
    }

    /// Loads a folder together with its partners.
    pub fn get_folder(&self, id: FolderId) -> GalleryResult<Folder> {
        let folder = self
            .conn
            .query_row(
                "SELECT id, name, owner, created_at, updated_at FROM folders WHERE id = ?1",
                params![id],
                folder_from_row,
            )
            .optional()?
            .ok_or_else(|| GalleryError::NotFound(format!("folder {id}")))?;
        self.attach_partners(folder)
    }

    pub fn list_owned_folders(&self, owner: UserId) -> GalleryResult<Vec<Folder>> {
        self.query_folders(
            "SELECT id, name, owner, created_at, updated_at
             FROM folders WHERE owner = ?1
             ORDER BY updated_at DESC, id DESC",
            owner,
        )
    }

    /// Folders in which `user` is a partner.
    pub fn list_shared_folders(&self, user: UserId) -> GalleryResult<Vec<Folder>> {
        self.query_folders(
            "SELECT f.id, f.name, f.owner, f.created_at, f.updated_at
             FROM folders f
             JOIN partners p ON p.folder_id = f.id
             WHERE p.user_id = ?1
             ORDER BY f.updated_at DESC, f.id DESC",
            user,
        )
    }

    fn query_folders(&self, sql: &str, user: UserId) -> GalleryResult<Vec<Folder>> {
        let mut stmt = self.conn.prepare(sql)?;
        let folders = stmt
            .query_map(params![user], folder_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        folders
            .into_iter()
            .map(|f| self.attach_partners(f))
            .collect()
    }

    fn attach_partners(&self, mut folder: Folder) -> GalleryResult<Folder> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.name, u.email, p.access
             FROM partners p
             JOIN users u ON u.id = p.user_id
             WHERE p.folder_id = ?1
             ORDER BY p.created_at, u.id",
        )?;
        let rows = stmt
            .query_map(params![folder.id], |row| {
                Ok((
                    row.get::<_, UserId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        folder.partners = rows
            .into_iter()
            .map(|(user_id, name, email, access)| {
                Ok(Partner {
                    user_id,
                    name,
                    email,
                    access: Access::from_i64(access)?,
                })
            })
            .collect::<GalleryResult<Vec<_>>>()?;
        Ok(folder)
    }

    pub fn rename_folder(&self, id: FolderId, name: &str) -> GalleryResult<Folder> {
        let name = validate_folder_name(name)?;
        let changed = self.conn.execute(
            "UPDATE folders SET name = ?1, updated_at = ?2 WHERE id = ?3",
            params![name, Self::now(), id],
        )?;
        if changed == 0 {
            return Err(GalleryError::NotFound(format!("folder {id}")));
        }
        self.get_folder(id)
    }

    /// Deletes a folder with its partners and image rows.
    pub fn delete_folder(&self, id: FolderId) -> GalleryResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM folders WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(GalleryError::NotFound(format!("folder {id}")));
        }
        debug!(folder = id, "deleted folder");
        Ok(())
    }

    fn touch_folder(&self, id: FolderId) -> GalleryResult<()> {
        self.conn.execute(
            "UPDATE folders SET updated_at = ?1 WHERE id = ?2",
            params![Self::now(), id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Partners
    // =========================================================================

    /// Shares a folder with the user registered under `email`.
    pub fn add_partner(
        &self,
        folder_id: FolderId,
        email: &str,
        access: Access,
    ) -> GalleryResult<Folder> {
        let folder = self.get_folder(folder_id)?;
        let user = self
            .find_user_by_email(email)?
            .ok_or_else(|| GalleryError::NotFound(format!("no user with email {email}")))?;

        if user.id == folder.owner {
            return Err(GalleryError::Validation(
                "the owner cannot be added as a partner".to_string(),
            ));
        }
        if folder.partner(user.id).is_some() {
            return Err(GalleryError::Conflict(format!(
                "{} is already a partner",
                user.email
            )));
        }

        self.conn.execute(
            "INSERT INTO partners (folder_id, user_id, access, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![folder_id, user.id, access.as_u8(), Self::now()],
        )?;
        self.touch_folder(folder_id)?;
        debug!(folder = folder_id, partner = user.id, "added partner");
        self.get_folder(folder_id)
    }

    pub fn set_partner_access(
        &self,
        folder_id: FolderId,
        user: UserId,
        access: Access,
    ) -> GalleryResult<Folder> {
        let changed = self.conn.execute(
            "UPDATE partners SET access = ?1 WHERE folder_id = ?2 AND user_id = ?3",
            params![access.as_u8(), folder_id, user],
        )?;
        if changed == 0 {
            return Err(GalleryError::NotFound(format!(
                "user {user} is not a partner of folder {folder_id}"
            )));
        }
        self.touch_folder(folder_id)?;
        self.get_folder(folder_id)
    }

    pub fn remove_partner(&self, folder_id: FolderId, user: UserId) -> GalleryResult<Folder> {
        let changed = self.conn.execute(
            "DELETE FROM partners WHERE folder_id = ?1 AND user_id = ?2",
            params![folder_id, user],
        )?;
        if changed == 0 {
            return Err(GalleryError::NotFound(format!(
                "user {user} is not a partner of folder {folder_id}"
            )));
        }
        self.touch_folder(folder_id)?;
        self.get_folder(folder_id)
    }

    pub fn clear_partners(&self, folder_id: FolderId) -> GalleryResult<Folder> {
        self.get_folder(folder_id)?;
        self.conn.execute(
            "DELETE FROM partners WHERE folder_id = ?1",
            params![folder_id],
        )?;
        self.touch_folder(folder_id)?;
        self.get_folder(folder_id)
    }

    // =========================================================================
    // Images
    // =========================================================================

    pub fn insert_image(
        &self,
        folder_id: FolderId,
        object_key: &str,
        thumb_key: &str,
        width: u32,
        height: u32,
    ) -> GalleryResult<ImageRecord> {
        if width == 0 || height == 0 {
            return Err(GalleryError::Validation(format!(
                "image has non-positive dimensions {width}x{height}"
            )));
        }
        self.conn.execute(
            "INSERT INTO images (folder_id, object_key, thumb_key, width, height, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![folder_id, object_key, thumb_key, width, height, Self::now()],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch_folder(folder_id)?;
        self.get_image(id)
    }

    pub fn get_image(&self, id: PhotoId) -> GalleryResult<ImageRecord> {
        self.conn
            .query_row(
                "SELECT id, folder_id, object_key, thumb_key, width, height, created_at
                 FROM images WHERE id = ?1",
                params![id],
                image_from_row,
            )
            .optional()?
            .ok_or_else(|| GalleryError::NotFound(format!("image {id}")))
    }

    /// Deletes an image row and returns it so its stored objects can be removed.
    pub fn delete_image(&self, id: PhotoId) -> GalleryResult<ImageRecord> {
        let record = self.get_image(id)?;
        self.conn
            .execute("DELETE FROM images WHERE id = ?1", params![id])?;
        Ok(record)
    }

    /// Returns page `page` (1-based, newest first) and whether more pages follow.
    pub fn list_images(
        &self,
        folder_id: FolderId,
        page: u32,
        page_size: u32,
    ) -> GalleryResult<(Vec<ImageRecord>, bool)> {
        let page_size = page_size.max(1);
        let offset = i64::from(page.max(1) - 1) * i64::from(page_size);

        let mut stmt = self.conn.prepare(
            "SELECT id, folder_id, object_key, thumb_key, width, height, created_at
             FROM images WHERE folder_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let mut images = stmt
            .query_map(
                params![folder_id, i64::from(page_size) + 1, offset],
                image_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = images.len() > page_size as usize;
        images.truncate(page_size as usize);
        Ok((images, has_more))
    }

    /// Returns the current Unix timestamp.
    pub fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get(0)?,
        name: row.get(1)?,
        owner: row.get(2)?,
        partners: Vec::new(),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn image_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        folder_id: row.get(1)?,
        object_key: row.get(2)?,
        thumb_key: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn validate_folder_name(name: &str) -> GalleryResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GalleryError::Validation(
            "folder name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_FOLDER_NAME {
        return Err(GalleryError::Validation(format!(
            "folder name longer than {MAX_FOLDER_NAME} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(GalleryError::Validation(
            "folder name contains control characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

fn validate_user_name(name: &str) -> GalleryResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(GalleryError::Validation("name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> GalleryResult<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(GalleryError::Validation(format!("invalid email {email:?}"))),
    }
}
