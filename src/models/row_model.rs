use super::Photo;

/// A photo with its computed display size, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionedPhoto {
    pub photo: Photo,
    pub display_w: f64,
    pub display_h: f64,
    pub row_index: u32,
}

/// One justified row: a contiguous run `[start_index, end_index)` of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRow {
    pub row_index: u32,
    pub start_index: usize,
    pub end_index: usize,
    pub height_px: f64,
    pub items: Vec<PositionedPhoto>,
}

impl LayoutRow {
    pub fn new(
        row_index: u32,
        start_index: usize,
        height_px: f64,
        items: Vec<PositionedPhoto>,
    ) -> Self {
        Self {
            row_index,
            start_index,
            end_index: start_index + items.len(),
            height_px,
            items,
        }
    }

    /// Sum of display widths plus the gaps between them.
    pub fn used_width(&self, margin: f64) -> f64 {
        let widths: f64 = self.items.iter().map(|p| p.display_w).sum();
        widths + margin * self.items.len().saturating_sub(1) as f64
    }
}

/// Flattens rows into the row-major sequence the renderer consumes.
pub fn flatten_rows(rows: Vec<LayoutRow>) -> Vec<PositionedPhoto> {
    rows.into_iter().flat_map(|row| row.items).collect()
}
