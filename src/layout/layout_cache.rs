use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use xxhash_rust::xxh3::xxh3_64;

use crate::layout::justified::{JustifiedLayout, RowBreak};
use crate::models::{LayoutRow, Photo};

/// Maximum number of cached layouts to keep in memory.
const MAX_CACHE_ENTRIES: usize = 8;

/// Key for the layout cache.
///
/// Justified breaks depend on the exact width, so widths are not bucketed; the
/// search window is part of the key because it changes the breaks too.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct CacheKey {
    width: u32,
    search_window: usize,
    list_hash: u64,
}

/// Cached layout data: the row breaks that can reconstruct the full layout.
#[derive(Debug, Clone)]
struct CachedLayout {
    breaks: Vec<RowBreak>,
    /// Number of photos this layout was computed for
    item_count: usize,
}

/// Layout cache for storing and retrieving row breaks.
///
/// Resizing back and forth between a few widths, or re-rendering after an
/// unrelated state change, reuses breaks instead of re-running the search.
/// The list hash covers id and dimensions of every photo in order, so appending a
/// page, prepending an upload, or deleting a photo all miss.
pub struct LayoutCache {
    cache: Mutex<LruCache<CacheKey, CachedLayout>>,
}

impl LayoutCache {
    /// Creates a new empty layout cache.
    pub fn new() -> Self {
        Self::with_capacity(MAX_CACHE_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Computes a fast hash of the photo list.
    pub fn compute_list_hash(photos: &[Photo]) -> u64 {
        let mut hasher_input = Vec::with_capacity(photos.len() * 16);
        for photo in photos {
            hasher_input.extend_from_slice(&photo.id.to_le_bytes());
            hasher_input.extend_from_slice(&photo.width.to_le_bytes());
            hasher_input.extend_from_slice(&photo.height.to_le_bytes());
        }
        xxh3_64(&hasher_input)
    }

    /// Attempts to retrieve cached row breaks.
    /// Returns None on cache miss or when the cached item count disagrees.
    fn get_breaks(&self, key: &CacheKey, item_count: usize) -> Option<Vec<RowBreak>> {
        let mut cache = self.cache.lock();
        let entry = cache.get(key)?;
        if entry.item_count != item_count {
            return None;
        }
        Some(entry.breaks.clone())
    }

    fn set(&self, key: CacheKey, breaks: Vec<RowBreak>, item_count: usize) {
        self.cache.lock().put(key, CachedLayout { breaks, item_count });
    }

    /// Computes the layout, using cached breaks if available.
    ///
    /// `search_window` is taken as given; see
    /// [`JustifiedLayout::compute_breaks_in_window`].
    pub fn compute(
        &self,
        layout: &JustifiedLayout,
        photos: &[Photo],
        container_width: u32,
        search_window: usize,
    ) -> Vec<LayoutRow> {
        if photos.is_empty() || container_width == 0 {
            return Vec::new();
        }

        let key = CacheKey {
            width: container_width,
            search_window,
            list_hash: Self::compute_list_hash(photos),
        };

        if let Some(breaks) = self.get_breaks(&key, photos.len()) {
            tracing::trace!(container_width, "layout cache hit");
            return layout.rows_from_breaks(photos, &breaks);
        }

        let breaks = layout.compute_breaks_in_window(photos, container_width as f64, search_window);
        let rows = layout.rows_from_breaks(photos, &breaks);
        self.set(key, breaks, photos.len());
        rows
    }
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl LayoutCache {
    fn len(&self) -> usize {
        self.cache.lock().len()
    }
}
