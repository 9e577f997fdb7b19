//! Per-cell bounding boxes for object-detection training.
//!
//! Every interior grid cell (one with a full neighbour on each side) gets a
//! box one pixel larger than the cell on every side, normalized by the full
//! image size. Boxes are emitted row-major: all of grid row 0 in increasing
//! column order, then row 1, and so on.
//!
//! ```text
//! xMin = ((c + 1) * cell_width  - border) / width
//! xMax = ((c + 2) * cell_width  + border) / width
//! yMin = ((r + 1) * cell_height - border) / height
//! yMax = ((r + 2) * cell_height + border) / height
//!
//! for r in 0..rows-2, c in 0..columns-2
//! ```
//!
//! Results are never clamped to `[0, 1]`; downstream consumers expect the raw
//! fractions. A grid too small to have interior cells, or a record whose
//! geometry is not yet resolved, yields an empty list rather than an error.

use crate::metadata::{BBox, DEFAULT_LABEL, ImageMetadata};

/// Pixels added around each cell.
pub const BORDER: u32 = 1;

/// Label and border applied to every box.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxOptions {
    pub label: String,
    pub border: u32,
}

impl Default for BoxOptions {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            border: BORDER,
        }
    }
}

/// Compute boxes with the default label and border.
pub fn compute_bounding_boxes(meta: &ImageMetadata) -> Vec<BBox> {
    compute_bounding_boxes_with(meta, &BoxOptions::default())
}

/// Compute boxes with a caller-supplied label and border.
pub fn compute_bounding_boxes_with(meta: &ImageMetadata, options: &BoxOptions) -> Vec<BBox> {
    let width = meta.width() as f64;
    let height = meta.height() as f64;
    let cell_w = meta.cell_width() as f64;
    let cell_h = meta.cell_height() as f64;
    if width == 0.0 || height == 0.0 || cell_w == 0.0 || cell_h == 0.0 {
        return Vec::new();
    }

    let border = options.border as f64;
    let interior_cols = meta.columns().saturating_sub(2);
    let interior_rows = meta.rows().saturating_sub(2);

    let mut boxes = Vec::with_capacity(interior_cols as usize * interior_rows as usize);
    for r in 0..interior_rows {
        let top = (r + 1) as f64 * cell_h;
        for c in 0..interior_cols {
            let left = (c + 1) as f64 * cell_w;
            boxes.push(BBox {
                x_min: (left - border) / width,
                x_max: (left + cell_w + border) / width,
                y_min: (top - border) / height,
                y_max: (top + cell_h + border) / height,
                label: options.label.clone(),
            });
        }
    }
    boxes
}
