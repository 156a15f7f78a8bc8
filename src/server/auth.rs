//! Password hashing, bearer tokens and the `AuthUser` extractor.
//!
//! Tokens are `base64url(user id) "." base64url(HMAC-SHA256(secret, first part))`.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

use super::AppState;
use crate::error::{GalleryError, GalleryResult};
use crate::models::UserId;

type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;

/// Hashes a new password with Argon2id into a PHC string (salt and parameters included).
pub fn hash_password(password: &str) -> GalleryResult<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|err| GalleryError::Storage(format!("password salt: {err}")))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| GalleryError::Storage(format!("password hashing failed: {err}")))?;
    Ok(hash.to_string())
}

/// Checks a password against a stored PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn validate_password(password: &str) -> GalleryResult<()> {
    if password.chars().count() < 6 {
        return Err(GalleryError::Validation(
            "password must be at least 6 characters".to_string(),
        ));
    }
    Ok(())
}

/// Issues and checks bearer tokens.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Signer with a fresh random secret; tokens do not survive a restart.
    pub fn random() -> Self {
        let mut secret = [0u8; 32];
        rand::rng().fill(&mut secret);
        Self::new(secret.to_vec())
    }

    fn mac(&self) -> GalleryResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| GalleryError::Storage(format!("invalid token secret: {err}")))
    }

    pub fn issue(&self, user: UserId) -> GalleryResult<String> {
        let payload = URL_SAFE_NO_PAD.encode(user.to_string());
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> GalleryResult<UserId> {
        let invalid = || GalleryError::Unauthenticated("invalid token".to_string());

        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let id = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        std::str::from_utf8(&id)
            .ok()
            .and_then(|id| id.parse::<UserId>().ok())
            .ok_or_else(invalid)
    }
}

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = GalleryError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| GalleryError::Unauthenticated("missing bearer token".to_string()))?;

        let id = state.tokens.verify(token.trim())?;
        // Tokens of deleted users are rejected.
        state
            .store
            .lock()
            .get_user(id)
            .map_err(|_| GalleryError::Unauthenticated("unknown user".to_string()))?;
        Ok(AuthUser { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));

        // Fresh salt each time.
        assert_ne!(hash, hash_password("hunter22").unwrap());
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("hunter22", ""));
        assert!(!verify_password("hunter22", "not-a-phc-string"));
    }

    #[test]
    fn test_password_length() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn test_token_verifies() {
        let signer = TokenSigner::new(b"secret".to_vec());
        let token = signer.issue(42).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), 42);
    }

    #[test]
    fn test_token_rejects_tampering() {
        let signer = TokenSigner::new(b"secret".to_vec());
        let token = signer.issue(42).unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged = format!("{}.{signature}", URL_SAFE_NO_PAD.encode("43"));

        assert!(matches!(
            signer.verify(&forged).unwrap_err(),
            GalleryError::Unauthenticated(_)
        ));
        assert!(signer.verify("garbage").is_err());
        assert!(TokenSigner::new(b"other".to_vec()).verify(&token).is_err());
    }
}
