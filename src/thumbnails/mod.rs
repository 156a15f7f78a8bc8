//! Thumbnail generation for uploaded images.
//!
//! - `ThumbnailGenerator` - decodes upload bytes and encodes a JPEG thumbnail

pub mod generator;

pub use generator::{Thumbnail, ThumbnailGenerator, DEFAULT_THUMB_HEIGHT};
