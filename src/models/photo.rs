use crate::error::{GalleryError, GalleryResult};

pub type PhotoId = i64;

/// A photo as the layout engine sees it.
///
/// Dimensions are reduced to lowest terms on construction; only the aspect ratio
/// matters for layout. Only [`Photo::new`] builds one; wire data goes through
/// `ImageDto::into_photo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    pub id: PhotoId,
    pub src: String,
    pub thumb: String,
    pub width: u32,
    pub height: u32,
}

impl Photo {
    pub fn new(
        id: PhotoId,
        src: impl Into<String>,
        thumb: impl Into<String>,
        width: u32,
        height: u32,
    ) -> GalleryResult<Self> {
        if width == 0 || height == 0 {
            return Err(GalleryError::Validation(format!(
                "photo {id} has non-positive dimensions {width}x{height}"
            )));
        }
        let (width, height) = reduce(width, height);
        Ok(Self {
            id,
            src: src.into(),
            thumb: thumb.into(),
            width,
            height,
        })
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Reduces `width:height` to lowest terms.
pub fn reduce(width: u32, height: u32) -> (u32, u32) {
    let d = gcd(width, height).max(1);
    (width / d, height / d)
}
