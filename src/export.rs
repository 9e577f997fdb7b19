//! Exchange formats at the edges of the pipeline.
//!
//! Stage 3 flattens each processed record into a [`MetadataDocument`], the
//! shape a document store keeps per image, written as JSON lines:
//!
//! ```json
//! {"uid":"9f2c…","parentUid":"","title":"Canal Street [14x20]","sourceId":"1fecohw",
//!  "sourceUrl":"https://i.redd.it/85fbl81s57od1.jpeg","filename":"canal_street.14x20.jpg",
//!  "width":560,"height":800,"columns":14,"rows":20,"isShard":false,"isUsable":true,
//!  "VTT":{"imageWidth":560,…},"BBoxes":[{"xMin":0.0696…,"displayName":"cell"},…]}
//! ```
//!
//! Two converters handle data coming back from model tooling:
//!
//! - [`vtt_to_bounding_boxes`] rebuilds boxes from a bare VTT calibration.
//! - [`prediction_to_training_row`] turns a batch prediction into a training
//!   row, keeping only confident boxes.

use crate::bbox::compute_bounding_boxes;
use crate::metadata::{BBox, DEFAULT_LABEL, ImageMetadata, Vtt};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Flattened per-image document. `path` is reduced to its file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDocument {
    pub uid: String,
    pub parent_uid: String,
    pub title: String,
    pub source_id: String,
    pub source_url: String,
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub columns: u32,
    pub rows: u32,
    pub is_shard: bool,
    pub is_usable: bool,
    #[serde(rename = "VTT")]
    pub vtt: Vtt,
    #[serde(rename = "BBoxes")]
    pub bboxes: Vec<BBox>,
    #[serde(rename = "gcsURI", default, skip_serializing_if = "Option::is_none")]
    pub storage_uri: Option<String>,
}

impl MetadataDocument {
    /// Flatten a record. With a storage prefix, `gcsURI` is `{prefix}/{filename}`.
    pub fn from_metadata(meta: &ImageMetadata, storage_prefix: Option<&str>) -> Self {
        let filename = meta.path.rsplit('/').next().unwrap_or_default().to_string();
        let storage_uri =
            storage_prefix.map(|prefix| format!("{}/{}", prefix.trim_end_matches('/'), filename));
        Self {
            uid: meta.uid.clone(),
            parent_uid: meta.parent_uid.clone(),
            title: meta.title().to_string(),
            source_id: meta.source_id().to_string(),
            source_url: meta.source_url().to_string(),
            filename,
            width: meta.width(),
            height: meta.height(),
            columns: meta.columns(),
            rows: meta.rows(),
            is_shard: meta.is_shard,
            is_usable: meta.is_usable,
            vtt: meta.vtt(),
            bboxes: meta.bounding_boxes.clone(),
            storage_uri,
        }
    }
}

/// Write one JSON document per line. Returns the number written.
pub fn write_documents<'a>(
    metas: impl IntoIterator<Item = &'a ImageMetadata>,
    mut writer: impl Write,
    storage_prefix: Option<&str>,
) -> Result<usize, ExportError> {
    let mut count = 0;
    for meta in metas {
        let doc = MetadataDocument::from_metadata(meta, storage_prefix);
        serde_json::to_writer(&mut writer, &doc)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Write the documents of every record in the processed manifest at
/// `manifest_path` to `output`.
pub fn export(
    manifest_path: &Path,
    output: &Path,
    storage_prefix: Option<&str>,
) -> Result<usize, ExportError> {
    let manifest = crate::types::Manifest::read(manifest_path)?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::io::BufWriter::new(std::fs::File::create(output)?);
    write_documents(&manifest.images, file, storage_prefix)
}

// ============================================================================
// VTT records
// ============================================================================

/// A VTT calibration as exported by tabletop tools, plus the image location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VttRecord {
    pub path: String,
    #[serde(flatten)]
    pub vtt: Vtt,
}

/// Rebuild grid geometry from a VTT record and compute its boxes.
///
/// Columns and rows are `image / cell` (floored). Returns the boxes with the
/// record's path and image dimensions. A zero cell size yields no boxes.
pub fn vtt_to_bounding_boxes(record: &VttRecord) -> (Vec<BBox>, String, u32, u32) {
    let Vtt {
        image_width,
        image_height,
        cell_width,
        cell_height,
        ..
    } = record.vtt;
    let columns = image_width.checked_div(cell_width).unwrap_or(0);
    let rows = image_height.checked_div(cell_height).unwrap_or(0);
    let meta =
        ImageMetadata::new("", "", "").with_geometry(image_width, image_height, columns, rows);
    (
        compute_bounding_boxes(&meta),
        record.path.clone(),
        image_width,
        image_height,
    )
}

// ============================================================================
// Batch predictions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInstance {
    pub content: String,
}

/// Model output for one image. `bboxes` are `[xMin, xMax, yMin, yMax]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub ids: Vec<serde_json::Value>,
    pub bboxes: Vec<[f64; 4]>,
    pub confidences: Vec<f64>,
    #[serde(default, alias = "displayNames")]
    pub display_names: Vec<String>,
}

/// One line of a batch prediction output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub instance: PredictionInstance,
    pub prediction: Prediction,
}

/// One training example in the object-detection import format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRow {
    pub image_gcs_uri: String,
    pub bounding_box_annotations: Vec<BBox>,
}

/// Keep predicted boxes with confidence at or above `min_confidence`.
///
/// Boxes without a confidence are dropped; a missing display name falls back
/// to the default label.
pub fn prediction_to_training_row(batch: &BatchPrediction, min_confidence: f64) -> TrainingRow {
    let prediction = &batch.prediction;
    let annotations = prediction
        .bboxes
        .iter()
        .zip(&prediction.confidences)
        .enumerate()
        .filter(|(_, (_, confidence))| **confidence >= min_confidence)
        .map(|(i, (&[x_min, x_max, y_min, y_max], _))| {
            let label = prediction
                .display_names
                .get(i)
                .map_or(DEFAULT_LABEL, String::as_str);
            BBox::new(x_min, x_max, y_min, y_max).with_label(label)
        })
        .collect();
    TrainingRow {
        image_gcs_uri: batch.instance.content.clone(),
        bounding_box_annotations: annotations,
    }
}

/// Convert a JSON-lines prediction stream into JSON-lines training rows.
///
/// Blank lines are skipped. Returns the number of rows written.
pub fn convert_predictions(
    reader: impl BufRead,
    mut writer: impl Write,
    min_confidence: f64,
) -> Result<usize, ExportError> {
    let mut count = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let batch: BatchPrediction = serde_json::from_str(&line)?;
        let row = prediction_to_training_row(&batch, min_confidence);
        serde_json::to_writer(&mut writer, &row)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}
