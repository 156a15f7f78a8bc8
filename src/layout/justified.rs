use serde::{Deserialize, Serialize};

use super::search_window::SearchWindowHeuristic;
use crate::models::{LayoutRow, Photo, PositionedPhoto};

/// Configuration for the justified row layout.
///
/// Rows are packed left-to-right and scaled so every row except possibly the last
/// spans exactly the container width. Row breaks come from a shortest-path search
/// over break positions where a row may span at most `search_window` photos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JustifiedLayout {
    /// Target row height in pixels (default: 240)
    pub target_row_height: f64,
    /// Gap between photos in a row in pixels (default: 2)
    pub margin: f64,
    /// Fixed search window; estimated from the container when `None`.
    pub search_window: Option<usize>,
    pub heuristic: SearchWindowHeuristic,
}

impl Default for JustifiedLayout {
    fn default() -> Self {
        Self {
            target_row_height: 240.0,
            margin: 2.0,
            search_window: None,
            heuristic: SearchWindowHeuristic::default(),
        }
    }
}

/// Represents a row break for caching purposes.
/// Contains only the indices and height, not the actual photos.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowBreak {
    /// Start index in the photos array (inclusive)
    pub start_index: usize,
    /// End index in the photos array (exclusive)
    pub end_index: usize,
    /// The computed height for this row
    pub row_height: f64,
}

impl JustifiedLayout {
    /// Creates a layout with a fixed search window.
    pub fn new(target_row_height: f64, margin: f64, search_window: usize) -> Self {
        Self {
            target_row_height,
            margin,
            search_window: Some(search_window),
            heuristic: SearchWindowHeuristic::default(),
        }
    }

    /// The search window used for a container of the given width.
    pub fn search_window_for(&self, container_width: f64) -> usize {
        self.search_window
            .unwrap_or_else(|| {
                self.heuristic
                    .estimate(container_width, self.target_row_height)
            })
            .max(1)
    }

    fn gaps(&self, count: usize) -> f64 {
        self.margin * count.saturating_sub(1) as f64
    }

    /// Row width at the target height, gaps included.
    fn natural_width(&self, ratio_sum: f64, count: usize) -> f64 {
        ratio_sum * self.target_row_height + self.gaps(count)
    }

    /// Height that makes the row span `container_width` exactly.
    fn justified_height(&self, ratio_sum: f64, count: usize, container_width: f64) -> f64 {
        ((container_width - self.gaps(count)) / ratio_sum).max(0.0)
    }

    /// A trailing row that fits at the target height is free: it is never stretched.
    fn fits_unscaled(&self, ratio_sum: f64, count: usize, container_width: f64) -> bool {
        self.natural_width(ratio_sum, count) <= container_width
    }

    fn row_cost(&self, ratio_sum: f64, count: usize, is_last: bool, container_width: f64) -> f64 {
        if is_last && self.fits_unscaled(ratio_sum, count, container_width) {
            return 0.0;
        }
        let deviation = self.natural_width(ratio_sum, count) - container_width;
        deviation * deviation
    }

    fn row_height(&self, ratio_sum: f64, count: usize, is_last: bool, container_width: f64) -> f64 {
        if is_last && self.fits_unscaled(ratio_sum, count, container_width) {
            self.target_row_height
        } else {
            self.justified_height(ratio_sum, count, container_width)
        }
    }

    /// Computes the justified layout for a list of photos.
    ///
    /// # Arguments
    /// * `photos` - Photos in display order
    /// * `container_width` - Usable width in pixels (already reduced by 1 for rounding)
    ///
    /// # Returns
    /// Rows covering every photo exactly once, in input order.
    pub fn compute(&self, photos: &[Photo], container_width: f64) -> Vec<LayoutRow> {
        let breaks = self.compute_breaks(photos, container_width);
        self.rows_from_breaks(photos, &breaks)
    }

    /// Same as [`compute`](Self::compute), flattened into row-major order.
    pub fn compute_positioned(&self, photos: &[Photo], container_width: f64) -> Vec<PositionedPhoto> {
        crate::models::flatten_rows(self.compute(photos, container_width))
    }

    /// Computes row breaks (indices and heights) without building rows.
    ///
    /// # Algorithm
    /// 1. Prefix-sum the aspect ratios so any candidate row's ratio sum is O(1).
    /// 2. Relax every edge `start -> end` with `end - start <= search_window`,
    ///    costing each row by the squared gap between its natural width and the
    ///    container width (a trailing row that fits unscaled costs nothing).
    /// 3. Walk the cheapest path back from the last photo.
    pub fn compute_breaks(&self, photos: &[Photo], container_width: f64) -> Vec<RowBreak> {
        let window = self.search_window_for(container_width);
        self.compute_breaks_in_window(photos, container_width, window)
    }

    /// Same as [`compute_breaks`](Self::compute_breaks) with an explicit search window.
    ///
    /// Callers that shrink the container for rounding estimate the window from the
    /// measured width and pass it here, so the adjustment never moves the estimate
    /// across the narrow-screen threshold.
    pub fn compute_breaks_in_window(
        &self,
        photos: &[Photo],
        container_width: f64,
        window: usize,
    ) -> Vec<RowBreak> {
        if photos.is_empty() || !(container_width > 0.0) || !(self.target_row_height > 0.0) {
            return Vec::new();
        }

        let n = photos.len();
        let window = window.max(1);

        let mut prefix = Vec::with_capacity(n + 1);
        prefix.push(0.0f64);
        for photo in photos {
            let last = prefix[prefix.len() - 1];
            prefix.push(last + photo.aspect_ratio());
        }

        let mut best = vec![f64::INFINITY; n + 1];
        let mut prev = vec![0usize; n + 1];
        best[0] = 0.0;

        for start in 0..n {
            if !best[start].is_finite() {
                continue;
            }
            let last_end = (start + window).min(n);
            for end in (start + 1)..=last_end {
                let ratio_sum = prefix[end] - prefix[start];
                let cost =
                    best[start] + self.row_cost(ratio_sum, end - start, end == n, container_width);
                if cost < best[end] {
                    best[end] = cost;
                    prev[end] = start;
                }
            }
        }

        let mut bounds = Vec::new();
        let mut end = n;
        while end > 0 {
            let start = prev[end];
            bounds.push((start, end));
            end = start;
        }
        bounds.reverse();

        bounds
            .into_iter()
            .map(|(start, end)| {
                let ratio_sum = prefix[end] - prefix[start];
                RowBreak {
                    start_index: start,
                    end_index: end,
                    row_height: self.row_height(ratio_sum, end - start, end == n, container_width),
                }
            })
            .collect()
    }

    /// Reconstructs rows from breaks without re-running the search.
    ///
    /// Breaks that do not fit `photos` (stale cache entries) end the reconstruction.
    pub fn rows_from_breaks(&self, photos: &[Photo], breaks: &[RowBreak]) -> Vec<LayoutRow> {
        let mut rows = Vec::with_capacity(breaks.len());
        for (row_idx, brk) in breaks.iter().enumerate() {
            let Some(slice) = photos.get(brk.start_index..brk.end_index) else {
                break;
            };
            let row_index = row_idx as u32;
            let items = slice
                .iter()
                .map(|photo| PositionedPhoto {
                    photo: photo.clone(),
                    display_w: brk.row_height * photo.aspect_ratio(),
                    display_h: brk.row_height,
                    row_index,
                })
                .collect();
            rows.push(LayoutRow::new(row_index, brk.start_index, brk.row_height, items));
        }
        rows
    }
}
