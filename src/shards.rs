//! Shard planning and materialization for oversized grid maps.
//!
//! Detection models train poorly on maps with hundreds of tiny cells, so
//! images whose cell count exceeds a budget are cut into smaller "shards",
//! each itself a valid grid image.
//!
//! ## Planning strategies
//!
//! - **Sampling** ([`plan_shards`]), the default. A fixed number of
//!   independent draws, each a uniformly random `shard_cols × shard_rows`
//!   window aligned to the grid. Draws may overlap; what happens to overlaps
//!   is an explicit [`OverlapPolicy`].
//! - **Tiling** ([`plan_tiles`]): a deterministic partition into 22 × 22 cell
//!   blocks, plus a strip along the right edge and one along the bottom edge
//!   for the cells the blocks leave over.
//!
//! Randomness is always injected, so a seeded `StdRng` reproduces a plan.
//!
//! ## Materialization
//!
//! [`materialize_shard`] crops the parent file to a planned rectangle,
//! writes it next to the parent under a [derived path](crate::naming::derive_shard_path),
//! and returns a brand-new record whose uid is the hash of the cropped pixels.
//! The parent record is never modified.

use crate::hash::content_hash;
use crate::imaging::{BackendError, CropParams, ImageBackend, Quality};
use crate::metadata::{ImageMetadata, MetadataOverrides};
use crate::naming::derive_shard_path;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Default shard width in grid cells.
pub const DEFAULT_SHARD_COLUMNS: u32 = 20;
/// Default shard height in grid cells.
pub const DEFAULT_SHARD_ROWS: u32 = 20;
/// Side of a square tiling block, in cells. A 22 × 22 block is the largest
/// square that stays under 500 cells.
pub const TILE_CELLS: u32 = 22;

#[derive(Error, Debug)]
pub enum CropError {
    #[error("Crop failed: {0}")]
    Backend(#[from] BackendError),
    #[error("Parent image has no local file")]
    MissingPath,
    #[error("Shard region {0:?} is empty")]
    EmptyRegion(ShardRect),
    #[error("Shard region {rect:?} exceeds {width}x{height} parent image")]
    OutOfBounds {
        rect: ShardRect,
        width: u32,
        height: u32,
    },
}

/// A planned shard: pixel rectangle in the parent plus the shard's grid size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardRect {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
    pub columns: u32,
    pub rows: u32,
}

impl ShardRect {
    /// `(x_min, y_min, x_max, y_max, columns, rows)`.
    pub fn as_tuple(&self) -> (u32, u32, u32, u32, u32, u32) {
        (
            self.x_min,
            self.y_min,
            self.x_max,
            self.y_max,
            self.columns,
            self.rows,
        )
    }

    pub fn width(&self) -> u32 {
        self.x_max.saturating_sub(self.x_min)
    }

    pub fn height(&self) -> u32 {
        self.y_max.saturating_sub(self.y_min)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// True if the two rectangles share any interior area.
    pub fn overlaps(&self, other: &ShardRect) -> bool {
        self.x_min < other.x_max
            && other.x_min < self.x_max
            && self.y_min < other.y_max
            && other.y_min < self.y_max
    }
}

/// What to do when random draws land on already-chosen territory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Keep every draw, duplicates included.
    #[default]
    Allow,
    /// Drop draws identical to an earlier one.
    Dedup,
    /// Drop draws that overlap any earlier accepted draw.
    Reject,
}

/// How an oversized image is cut.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardStrategy {
    /// Random windows, see [`plan_shards_with`].
    #[default]
    Sample,
    /// Deterministic blocks, see [`plan_tiles`].
    Tile,
}

/// Parameters for random shard sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPlan {
    pub count: usize,
    pub columns: u32,
    pub rows: u32,
    pub overlap: OverlapPolicy,
}

impl Default for ShardPlan {
    fn default() -> Self {
        Self {
            count: 2,
            columns: DEFAULT_SHARD_COLUMNS,
            rows: DEFAULT_SHARD_ROWS,
            overlap: OverlapPolicy::Allow,
        }
    }
}

/// Sample `num_shards` random shard windows of `shard_cols × shard_rows` cells.
///
/// Returns `None` when the requested footprint is larger than the whole grid
/// (or the grid geometry is unresolved), and `Some(vec![])` when zero shards
/// are requested. Every draw is kept, overlapping or not.
pub fn plan_shards(
    meta: &ImageMetadata,
    num_shards: usize,
    shard_cols: u32,
    shard_rows: u32,
    rng: &mut impl Rng,
) -> Option<Vec<ShardRect>> {
    plan_shards_with(
        meta,
        &ShardPlan {
            count: num_shards,
            columns: shard_cols,
            rows: shard_rows,
            overlap: OverlapPolicy::Allow,
        },
        rng,
    )
}

/// Sample shard windows with an explicit overlap policy.
///
/// Exactly `plan.count` draws are made; `Dedup` and `Reject` filter them, so
/// the result may be shorter than `plan.count`.
pub fn plan_shards_with(
    meta: &ImageMetadata,
    plan: &ShardPlan,
    rng: &mut impl Rng,
) -> Option<Vec<ShardRect>> {
    let columns = meta.columns();
    let rows = meta.rows();
    let footprint = plan.columns as u64 * plan.rows as u64;
    if footprint == 0 || footprint > meta.total_cells() {
        return None;
    }
    if meta.cell_width() == 0 || meta.cell_height() == 0 {
        return None;
    }

    // The footprint fits in total, but one side may still be longer than the grid.
    let shard_cols = plan.columns.min(columns);
    let shard_rows = plan.rows.min(rows);
    let cell_w = meta.cell_width();
    let cell_h = meta.cell_height();

    let mut shards: Vec<ShardRect> = Vec::with_capacity(plan.count);
    for _ in 0..plan.count {
        let start_col = rng.gen_range(0..=columns - shard_cols);
        let start_row = rng.gen_range(0..=rows - shard_rows);
        let rect = ShardRect {
            x_min: start_col * cell_w,
            y_min: start_row * cell_h,
            x_max: (start_col + shard_cols) * cell_w,
            y_max: (start_row + shard_rows) * cell_h,
            columns: shard_cols,
            rows: shard_rows,
        };

        let keep = match plan.overlap {
            OverlapPolicy::Allow => true,
            OverlapPolicy::Dedup => !shards.contains(&rect),
            OverlapPolicy::Reject => !shards.iter().any(|s| s.overlaps(&rect)),
        };
        if keep {
            shards.push(rect);
        } else {
            tracing::debug!(?rect, policy = ?plan.overlap, "Dropped overlapping shard draw");
        }
    }
    Some(shards)
}

/// Deterministically tile a grid larger than `max_cells` into 22 × 22 blocks.
///
/// Returns `None` when the image has `max_cells` cells or fewer. A side
/// shorter than one block becomes a single block spanning the whole side.
/// Cells left over on the right and bottom are covered by edge strips, one
/// strip segment per block row (right edge) or block column (bottom edge).
/// The bottom-right corner where both strips would meet is not covered.
pub fn plan_tiles(meta: &ImageMetadata, max_cells: u64) -> Option<Vec<ShardRect>> {
    let columns = meta.columns();
    let rows = meta.rows();
    if meta.total_cells() <= max_cells {
        return None;
    }
    let width = meta.width();
    let height = meta.height();
    let cell_w = meta.cell_width();
    let cell_h = meta.cell_height();
    if cell_w == 0 || cell_h == 0 {
        return None;
    }

    let (mut h_shards, mut h_rem) = (columns / TILE_CELLS, columns % TILE_CELLS);
    let (mut v_shards, mut v_rem) = (rows / TILE_CELLS, rows % TILE_CELLS);
    let mut shard_cols = TILE_CELLS;
    let mut shard_rows = TILE_CELLS;

    // Narrow (portrait) map: one block spans the full width.
    if h_shards == 0 {
        h_shards = 1;
        h_rem = 0;
        shard_cols = columns;
    }
    // Short (landscape) map: one block spans the full height.
    if v_shards == 0 {
        v_shards = 1;
        v_rem = 0;
        shard_rows = rows;
    }

    let mut shards = Vec::new();

    let mut x_min = 0;
    for _ in 0..h_shards {
        let x_max = (x_min + cell_w * shard_cols).min(width);
        let mut y_min = 0;
        for _ in 0..v_shards {
            let y_max = (y_min + cell_h * shard_rows).min(height);
            shards.push(ShardRect {
                x_min,
                y_min,
                x_max,
                y_max,
                columns: shard_cols,
                rows: shard_rows,
            });
            y_min = y_max;
        }
        x_min = x_max;
    }

    if h_rem > 0 {
        let x_min = width.saturating_sub(h_rem * cell_w);
        let mut y_min = 0;
        for _ in 0..v_shards {
            let y_max = (y_min + cell_h * shard_rows).min(height);
            shards.push(ShardRect {
                x_min,
                y_min,
                x_max: width,
                y_max,
                columns: h_rem,
                rows: shard_rows,
            });
            y_min = y_max;
        }
    }

    if v_rem > 0 {
        let y_min = height.saturating_sub(v_rem * cell_h);
        let mut x_min = 0;
        for _ in 0..h_shards {
            let x_max = (x_min + cell_w * shard_cols).min(width);
            shards.push(ShardRect {
                x_min,
                y_min,
                x_max,
                y_max: height,
                columns: shard_cols,
                rows: v_rem,
            });
            x_min = x_max;
        }
    }

    Some(shards)
}

/// Crop `parent`'s file to `rect` and describe the result as a new record.
///
/// The shard is written at the derived path next to the parent. Its uid is the
/// hash of the cropped pixel buffer; provenance is copied from the parent and
/// `parent_uid` points back at it.
pub fn materialize_shard(
    backend: &impl ImageBackend,
    rect: &ShardRect,
    parent: &ImageMetadata,
    quality: Quality,
) -> Result<ImageMetadata, CropError> {
    if parent.path.is_empty() {
        return Err(CropError::MissingPath);
    }
    if rect.is_empty() {
        return Err(CropError::EmptyRegion(*rect));
    }
    let (width, height) = (parent.width(), parent.height());
    if width > 0 && height > 0 && (rect.x_max > width || rect.y_max > height) {
        return Err(CropError::OutOfBounds {
            rect: *rect,
            width,
            height,
        });
    }

    let path = derive_shard_path(&parent.path, rect.x_min, rect.y_min, rect.columns, rect.rows);
    let output = backend.crop(&CropParams {
        source: PathBuf::from(&parent.path),
        output: PathBuf::from(&path),
        x: rect.x_min,
        y: rect.y_min,
        width: rect.width(),
        height: rect.height(),
        quality,
    })?;

    Ok(ImageMetadata::with_overrides(
        parent.source_url(),
        parent.source_id(),
        parent.title(),
        MetadataOverrides {
            path: Some(path),
            uid: Some(content_hash(&output.pixels)),
            parent_uid: Some(parent.uid.clone()),
            width: Some(rect.width()),
            height: Some(rect.height()),
            columns: Some(rect.columns),
            rows: Some(rect.rows),
            is_shard: Some(true),
            ..Default::default()
        },
    ))
}
