//! REST backend: users, folders, partners, images and stored media.
//!
//! - `auth` - password hashing, bearer tokens, the `AuthUser` extractor
//! - `access` - owner / partner access rules
//! - `routes` - axum handlers under `/api` plus `/media/{*key}`

pub mod access;
pub mod auth;
pub mod routes;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::models::GalleryStore;
use crate::storage::{LocalObjectStorage, ObjectStorage};
use crate::thumbnails::ThumbnailGenerator;

pub use auth::{AuthUser, TokenSigner};
pub use routes::router;

/// Shared handler state. Cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<GalleryStore>>,
    pub storage: Arc<dyn ObjectStorage>,
    pub tokens: Arc<TokenSigner>,
    pub thumbnails: ThumbnailGenerator,
    pub page_size: u32,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Opens the database and object store below `data_dir`.
    ///
    /// Media URLs are built from `public_url`.
    pub fn open(config: &ServerConfig, data_dir: &Path, public_url: &str) -> Result<Self> {
        let store = GalleryStore::open(&data_dir.join("gallery.sqlite"))?;
        let storage = LocalObjectStorage::new(data_dir.join("objects"), public_url);

        let tokens = match &config.token_secret {
            Some(secret) => TokenSigner::new(secret.as_bytes().to_vec()),
            None => {
                warn!("No token_secret configured; issued tokens will not survive a restart");
                TokenSigner::random()
            }
        };

        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            storage: Arc::new(storage),
            tokens: Arc::new(tokens),
            thumbnails: ThumbnailGenerator::new(config.thumb_height),
            page_size: config.page_size.max(1),
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}

/// Binds, serves until Ctrl-C, then returns.
pub async fn serve(config: &ServerConfig) -> Result<()> {
    let data_dir = config.resolved_data_dir()?;
    let listener = TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    let addr: SocketAddr = listener.local_addr()?;

    let state = AppState::open(config, &data_dir, &config.public_url)?;
    info!(%addr, data_dir = ?data_dir, "pixfold server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;
    Ok(())
}
