//! The image record shared by every pipeline stage.
//!
//! An [`ImageMetadata`] is created as soon as a source image is identified
//! (before download) with only its provenance set, then enriched in place as
//! the pipeline learns more: file path and uid after download, pixel
//! dimensions after probing, grid size after inference, bounding boxes last.
//!
//! ## Derived cell dimensions
//!
//! `cell_width` and `cell_height` are never set directly. They are
//! recomputed by [`ImageMetadata::set_dimensions`], [`ImageMetadata::set_grid`]
//! and [`ImageMetadata::with_geometry`], so they cannot go stale:
//!
//! ```text
//! cell_width  = floor(width  / columns)
//! cell_height = floor(height / rows)
//! ```
//!
//! A grid of `1 × 1` is the "not yet known" sentinel and yields zero cell
//! dimensions, as does any zero among the four inputs.
//!
//! ## Provenance
//!
//! `source_url`, `source_id` and `title` are fixed at construction and only
//! readable afterwards. Shards copy them from their parent.

use serde::{Deserialize, Serialize};

/// Default label given to every grid-cell bounding box.
pub const DEFAULT_LABEL: &str = "cell";

/// A bounding box in normalized image coordinates.
///
/// Coordinates are fractions of the image width/height. They are not clamped:
/// boxes hugging an edge may extend slightly past `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    #[serde(rename = "displayName", default = "default_label")]
    pub label: String,
}

fn default_label() -> String {
    DEFAULT_LABEL.to_string()
}

impl BBox {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
            label: default_label(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Virtual-tabletop grid calibration, the shape VTT consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vtt {
    pub image_width: u32,
    pub image_height: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    #[serde(alias = "cellsOffsetX", default)]
    pub cell_offset_x: u32,
    #[serde(alias = "cellsOffsetY", default)]
    pub cell_offset_y: u32,
}

/// Every field that may be set when constructing an [`ImageMetadata`].
///
/// Provenance is passed to the constructor directly; everything else is an
/// optional override. Geometry overrides are applied together so the derived
/// cell dimensions are computed once from the final values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataOverrides {
    pub path: Option<String>,
    pub uid: Option<String>,
    pub parent_uid: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub columns: Option<u32>,
    pub rows: Option<u32>,
    pub cell_offset_x: Option<u32>,
    pub cell_offset_y: Option<u32>,
    pub is_shard: Option<bool>,
    pub is_usable: Option<bool>,
}

/// Metadata for one image on disk, either an original or a shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredMetadata")]
pub struct ImageMetadata {
    /// Content hash; empty until the image bytes are known.
    pub uid: String,
    /// Uid of the image this one was cropped from; empty for originals.
    pub parent_uid: String,
    source_url: String,
    source_id: String,
    title: String,
    /// Local filesystem path, set once the file is materialized.
    pub path: String,
    width: u32,
    height: u32,
    columns: u32,
    rows: u32,
    cell_width: u32,
    cell_height: u32,
    pub cell_offset_x: u32,
    pub cell_offset_y: u32,
    pub is_shard: bool,
    /// False once dimension probing failed; such records skip every later stage.
    pub is_usable: bool,
    pub bounding_boxes: Vec<BBox>,
}

impl ImageMetadata {
    /// Create a record with provenance only; geometry starts unknown.
    pub fn new(
        source_url: impl Into<String>,
        source_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            uid: String::new(),
            parent_uid: String::new(),
            source_url: source_url.into(),
            source_id: source_id.into(),
            title: title.into(),
            path: String::new(),
            width: 0,
            height: 0,
            columns: 1,
            rows: 1,
            cell_width: 0,
            cell_height: 0,
            cell_offset_x: 0,
            cell_offset_y: 0,
            is_shard: false,
            is_usable: true,
            bounding_boxes: Vec::new(),
        }
    }

    /// Create a record with provenance plus any subset of overridable fields.
    pub fn with_overrides(
        source_url: impl Into<String>,
        source_id: impl Into<String>,
        title: impl Into<String>,
        overrides: MetadataOverrides,
    ) -> Self {
        let mut meta = Self::new(source_url, source_id, title);
        let MetadataOverrides {
            path,
            uid,
            parent_uid,
            width,
            height,
            columns,
            rows,
            cell_offset_x,
            cell_offset_y,
            is_shard,
            is_usable,
        } = overrides;

        if let Some(path) = path {
            meta.path = path;
        }
        if let Some(uid) = uid {
            meta.uid = uid;
        }
        if let Some(parent_uid) = parent_uid {
            meta.parent_uid = parent_uid;
        }
        meta.width = width.unwrap_or(meta.width);
        meta.height = height.unwrap_or(meta.height);
        meta.columns = columns.unwrap_or(meta.columns);
        meta.rows = rows.unwrap_or(meta.rows);
        meta.cell_offset_x = cell_offset_x.unwrap_or(meta.cell_offset_x);
        meta.cell_offset_y = cell_offset_y.unwrap_or(meta.cell_offset_y);
        meta.is_shard = is_shard.unwrap_or(meta.is_shard);
        meta.is_usable = is_usable.unwrap_or(meta.is_usable);
        meta.recompute_cell_dimensions();
        meta
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cell_width(&self) -> u32 {
        self.cell_width
    }

    pub fn cell_height(&self) -> u32 {
        self.cell_height
    }

    /// Total number of grid cells (`columns × rows`).
    pub fn total_cells(&self) -> u64 {
        self.columns as u64 * self.rows as u64
    }

    /// True once the grid has been resolved past the `1 × 1` sentinel.
    pub fn has_grid(&self) -> bool {
        !(self.columns == 1 && self.rows == 1) && self.columns > 0 && self.rows > 0
    }

    /// Set pixel dimensions and recompute cell dimensions.
    pub fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.recompute_cell_dimensions();
    }

    /// Set grid size and recompute cell dimensions.
    pub fn set_grid(&mut self, columns: u32, rows: u32) {
        self.columns = columns;
        self.rows = rows;
        self.recompute_cell_dimensions();
    }

    /// Builder form: set all four geometry inputs at once.
    pub fn with_geometry(mut self, width: u32, height: u32, columns: u32, rows: u32) -> Self {
        self.width = width;
        self.height = height;
        self.columns = columns;
        self.rows = rows;
        self.recompute_cell_dimensions();
        self
    }

    /// Exclude this record from every downstream stage.
    pub fn mark_unusable(&mut self) {
        self.is_usable = false;
    }

    /// Grid calibration in VTT form.
    pub fn vtt(&self) -> Vtt {
        Vtt {
            image_width: self.width,
            image_height: self.height,
            cell_width: self.cell_width,
            cell_height: self.cell_height,
            cell_offset_x: self.cell_offset_x,
            cell_offset_y: self.cell_offset_y,
        }
    }

    fn recompute_cell_dimensions(&mut self) {
        let known = self.width > 0 && self.height > 0 && self.has_grid();
        if known {
            self.cell_width = self.width / self.columns;
            self.cell_height = self.height / self.rows;
        } else {
            self.cell_width = 0;
            self.cell_height = 0;
        }
    }
}

/// On-disk form of [`ImageMetadata`]. Derived cell dimensions are ignored on
/// read and recomputed, so a hand-edited manifest cannot make them disagree
/// with the geometry.
#[derive(Deserialize)]
struct StoredMetadata {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    parent_uid: String,
    #[serde(default)]
    source_url: String,
    #[serde(default)]
    source_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default = "one")]
    columns: u32,
    #[serde(default = "one")]
    rows: u32,
    #[serde(default)]
    cell_offset_x: u32,
    #[serde(default)]
    cell_offset_y: u32,
    #[serde(default)]
    is_shard: bool,
    #[serde(default = "yes")]
    is_usable: bool,
    #[serde(default)]
    bounding_boxes: Vec<BBox>,
}

fn one() -> u32 {
    1
}

fn yes() -> bool {
    true
}

impl From<StoredMetadata> for ImageMetadata {
    fn from(s: StoredMetadata) -> Self {
        let mut meta = ImageMetadata::with_overrides(
            s.source_url,
            s.source_id,
            s.title,
            MetadataOverrides {
                path: Some(s.path),
                uid: Some(s.uid),
                parent_uid: Some(s.parent_uid),
                width: Some(s.width),
                height: Some(s.height),
                columns: Some(s.columns),
                rows: Some(s.rows),
                cell_offset_x: Some(s.cell_offset_x),
                cell_offset_y: Some(s.cell_offset_y),
                is_shard: Some(s.is_shard),
                is_usable: Some(s.is_usable),
            },
        );
        meta.bounding_boxes = s.bounding_boxes;
        meta
    }
}
