//! pixfold: photo folders laid out as a justified grid.
//!
//! The client core (`layout`, `feed`, `resize`) lays out and pages a folder's photos;
//! `server` is the REST backend that stores them.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod feed;
pub mod image_loader;
pub mod layout;
pub mod models;
pub mod resize;
pub mod server;
pub mod storage;
pub mod thumbnails;

pub use error::{GalleryError, GalleryResult};
pub use feed::{Credential, HttpPhotoSource, PhotoFeed, PhotoSource, ViewScope};
pub use layout::{JustifiedLayout, LayoutCache, SearchWindowHeuristic};
pub use models::{Photo, PositionedPhoto};
pub use resize::{ResizeCoalescer, ResizeSignal};
