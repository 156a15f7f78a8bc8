//! Folder access rules.
//!
//! Owners can do everything. Partners can read; partners with `Access::Write`
//! can also upload and delete images. Only owners rename, delete or share.

use crate::error::{GalleryError, GalleryResult};
use crate::models::{Access, Folder, UserId};

pub fn is_owner(folder: &Folder, user: UserId) -> bool {
    folder.owner == user
}

pub fn can_read(folder: &Folder, user: UserId) -> bool {
    is_owner(folder, user) || folder.partner(user).is_some()
}

pub fn can_write(folder: &Folder, user: UserId) -> bool {
    is_owner(folder, user)
        || folder
            .partner(user)
            .is_some_and(|p| p.access == Access::Write)
}

/// Effective access level, if any.
pub fn access_of(folder: &Folder, user: UserId) -> Option<Access> {
    if is_owner(folder, user) {
        Some(Access::Write)
    } else {
        folder.partner(user).map(|p| p.access)
    }
}

pub fn require_read(folder: &Folder, user: UserId) -> GalleryResult<()> {
    if can_read(folder, user) {
        Ok(())
    } else {
        Err(GalleryError::Authorization(format!(
            "no read access to folder {}",
            folder.id
        )))
    }
}

pub fn require_write(folder: &Folder, user: UserId) -> GalleryResult<()> {
    if can_write(folder, user) {
        Ok(())
    } else {
        Err(GalleryError::Authorization(format!(
            "no write access to folder {}",
            folder.id
        )))
    }
}

pub fn require_owner(folder: &Folder, user: UserId) -> GalleryResult<()> {
    if is_owner(folder, user) {
        Ok(())
    } else {
        Err(GalleryError::Authorization(format!(
            "only the owner can manage folder {}",
            folder.id
        )))
    }
}

/// A partner target must be someone other than the caller.
pub fn validate_partner(caller: UserId, partner: UserId) -> GalleryResult<()> {
    if caller == partner {
        return Err(GalleryError::Validation(
            "cannot change your own partnership".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Partner;

    fn folder() -> Folder {
        let partner = |user_id, access| Partner {
            user_id,
            name: format!("user{user_id}"),
            email: format!("user{user_id}@example.com"),
            access,
        };
        Folder {
            id: 1,
            name: "Shared".into(),
            owner: 10,
            partners: vec![partner(20, Access::Read), partner(30, Access::Write)],
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_owner_has_everything() {
        let f = folder();
        assert!(require_read(&f, 10).is_ok());
        assert!(require_write(&f, 10).is_ok());
        assert!(require_owner(&f, 10).is_ok());
        assert_eq!(access_of(&f, 10), Some(Access::Write));
    }

    #[test]
    fn test_every_partner_can_read() {
        let f = folder();
        // Not only the first partner in the list.
        assert!(can_read(&f, 20));
        assert!(can_read(&f, 30));
        assert!(!can_read(&f, 40));
    }

    #[test]
    fn test_write_needs_write_access() {
        let f = folder();
        assert!(!can_write(&f, 20));
        assert!(can_write(&f, 30));
        assert!(matches!(
            require_write(&f, 20).unwrap_err(),
            GalleryError::Authorization(_)
        ));
        assert!(require_owner(&f, 30).is_err());
        assert_eq!(access_of(&f, 20), Some(Access::Read));
        assert_eq!(access_of(&f, 40), None);
    }

    #[test]
    fn test_validate_partner() {
        assert!(validate_partner(10, 20).is_ok());
        assert!(matches!(
            validate_partner(10, 10).unwrap_err(),
            GalleryError::Validation(_)
        ));
    }
}
