//! Batch processing of scanned maps.
//!
//! Stage 2 of the pipeline. Every image of the scan manifest goes through the
//! same synchronous sequence:
//!
//! ```text
//! probe ─→ grid ─→ shard decision ─┬─ within budget ─→ bounding boxes
//!                                  └─ oversized ─→ plan ─→ crop ─→ bounding boxes per shard
//! ```
//!
//! 1. **Probe**: read pixel dimensions. Unreadable or empty images are
//!    marked unusable and go no further.
//! 2. **Grid**: use the grid from the manifest; otherwise the file name
//!    token, then the title.
//! 3. **Shard decision**: an image with more than `shards.max_cells` cells
//!    is cut with the configured strategy. Its own boxes are not computed,
//!    unless no shard of the configured size fits its grid; it is then kept
//!    whole with a warning.
//! 4. **Boxes**: every usable image within budget, and every shard, gets one
//!    bounding box per interior cell.
//!
//! ## Parallelism and randomness
//!
//! Images are processed in parallel with rayon; each task owns its record.
//! Each image gets its own `StdRng`, seeded from `shards.seed` plus the
//! image's position in the manifest, so a seeded run produces the same shards
//! however the work is scheduled. Without a seed, plans come from entropy.
//!
//! A failed crop is logged, reported as a [`ProcessEvent::ShardFailed`] and
//! skipped; the rest of the image's shards still run.

use crate::bbox::compute_bounding_boxes_with;
use crate::config::{ConfigError, GridConfig};
use crate::imaging::{ImageBackend, Probe, Quality, RustBackend, probe_dimensions};
use crate::metadata::ImageMetadata;
use crate::naming::{find_grid_in_title, parse_grid_token};
use crate::shards::{ShardRect, ShardStrategy, materialize_shard, plan_shards_with, plan_tiles};
use crate::types::Manifest;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::path::Path;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Progress events emitted while processing, one or more per image.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    /// An image finished all stages.
    ImageProcessed {
        /// 1-based position in the manifest.
        index: usize,
        title: String,
        path: String,
        columns: u32,
        rows: u32,
        boxes: usize,
        shards: usize,
    },
    /// Probing failed; the image is excluded from every later stage.
    ImageUnusable {
        index: usize,
        title: String,
        path: String,
    },
    /// One planned shard could not be cropped.
    ShardFailed {
        index: usize,
        path: String,
        rect: ShardRect,
        error: String,
    },
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Originals that went through every stage.
    pub processed: usize,
    /// Paths of originals marked unusable.
    pub unusable: Vec<String>,
    pub shards_created: usize,
    pub shard_failures: usize,
    /// Bounding boxes over originals and shards.
    pub boxes: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} processed, {} unusable, {} shards, {} boxes",
            self.processed,
            self.unusable.len(),
            self.shards_created,
            self.boxes
        )?;
        if self.shard_failures > 0 {
            write!(f, ", {} failed crops", self.shard_failures)?;
        }
        Ok(())
    }
}

/// Output of a processing run.
#[derive(Debug)]
pub struct ProcessResult {
    pub manifest: Manifest,
    pub summary: RunSummary,
}

/// What one image produced.
struct ImageOutcome {
    original: ImageMetadata,
    shards: Vec<ImageMetadata>,
    failures: usize,
}

/// Process the scan manifest at `manifest_path` with the `image`-crate backend.
///
/// `config` replaces the manifest's embedded config when given.
pub fn process(
    manifest_path: &Path,
    config: Option<GridConfig>,
    progress: Option<Sender<ProcessEvent>>,
) -> Result<ProcessResult, PipelineError> {
    let content = std::fs::read_to_string(manifest_path)?;
    let mut manifest: Manifest = serde_json::from_str(&content)?;
    if let Some(config) = config {
        config.validate()?;
        manifest.config = config;
    }
    Ok(process_manifest(manifest, &RustBackend::new(), progress.as_ref()))
}

/// Run every image of `manifest` through the stages. Output order matches
/// input order: all originals first, then shards grouped by parent.
pub fn process_manifest(
    manifest: Manifest,
    backend: &impl ImageBackend,
    progress: Option<&Sender<ProcessEvent>>,
) -> ProcessResult {
    let Manifest { images, config } = manifest;

    let outcomes: Vec<ImageOutcome> = images
        .into_par_iter()
        .enumerate()
        .map(|(i, meta)| {
            let mut rng = image_rng(config.shards.seed, i);
            process_image(i + 1, meta, &config, backend, &mut rng, progress)
        })
        .collect();

    let mut summary = RunSummary::default();
    let mut originals = Vec::with_capacity(outcomes.len());
    let mut shards = Vec::new();
    for outcome in outcomes {
        if outcome.original.is_usable {
            summary.processed += 1;
        } else {
            summary.unusable.push(outcome.original.path.clone());
        }
        summary.boxes += outcome.original.bounding_boxes.len();
        summary.boxes += outcome
            .shards
            .iter()
            .map(|s| s.bounding_boxes.len())
            .sum::<usize>();
        summary.shards_created += outcome.shards.len();
        summary.shard_failures += outcome.failures;
        originals.push(outcome.original);
        shards.extend(outcome.shards);
    }
    originals.extend(shards);

    ProcessResult {
        manifest: Manifest {
            images: originals,
            config,
        },
        summary,
    }
}

/// Per-image generator: reproducible when a base seed is set.
fn image_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
        None => StdRng::from_entropy(),
    }
}

fn send(progress: Option<&Sender<ProcessEvent>>, event: ProcessEvent) {
    if let Some(tx) = progress {
        tx.send(event).ok();
    }
}

fn process_image(
    index: usize,
    mut meta: ImageMetadata,
    config: &GridConfig,
    backend: &impl ImageBackend,
    rng: &mut StdRng,
    progress: Option<&Sender<ProcessEvent>>,
) -> ImageOutcome {
    let unusable = |meta: ImageMetadata| {
        send(
            progress,
            ProcessEvent::ImageUnusable {
                index,
                title: meta.title().to_string(),
                path: meta.path.clone(),
            },
        );
        ImageOutcome {
            original: meta,
            shards: Vec::new(),
            failures: 0,
        }
    };

    if !meta.is_usable {
        return unusable(meta);
    }
    if probe_dimensions(backend, &mut meta) == Probe::Unusable {
        return unusable(meta);
    }

    resolve_grid(&mut meta);
    let options = config.boxes.options();
    let mut shards = Vec::new();
    let mut failures = 0;

    if meta.total_cells() > config.shards.max_cells {
        let plan = match config.shards.strategy {
            ShardStrategy::Sample => plan_shards_with(&meta, &config.shards.plan(), rng),
            ShardStrategy::Tile => plan_tiles(&meta, config.shards.max_cells),
        };
        let rects = match plan {
            Some(rects) => rects,
            None => {
                tracing::warn!(
                    path = %meta.path,
                    cells = meta.total_cells(),
                    "Shard footprint does not fit the grid, keeping the image whole"
                );
                meta.bounding_boxes = compute_bounding_boxes_with(&meta, &options);
                Vec::new()
            }
        };
        tracing::debug!(path = %meta.path, count = rects.len(), "Planned shards");

        let quality = Quality::new(config.shards.quality);
        for rect in rects.iter().filter(|r| !r.is_empty()) {
            match materialize_shard(backend, rect, &meta, quality) {
                Ok(mut shard) => {
                    shard.bounding_boxes = compute_bounding_boxes_with(&shard, &options);
                    shards.push(shard);
                }
                Err(e) => {
                    tracing::warn!(path = %meta.path, ?rect, error = %e, "Shard crop failed");
                    failures += 1;
                    send(
                        progress,
                        ProcessEvent::ShardFailed {
                            index,
                            path: meta.path.clone(),
                            rect: *rect,
                            error: e.to_string(),
                        },
                    );
                }
            }
        }
    } else {
        meta.bounding_boxes = compute_bounding_boxes_with(&meta, &options);
    }

    tracing::info!(
        path = %meta.path,
        boxes = meta.bounding_boxes.len(),
        shards = shards.len(),
        "Processed image"
    );
    send(
        progress,
        ProcessEvent::ImageProcessed {
            index,
            title: meta.title().to_string(),
            path: meta.path.clone(),
            columns: meta.columns(),
            rows: meta.rows(),
            boxes: meta.bounding_boxes.len(),
            shards: shards.len(),
        },
    );

    ImageOutcome {
        original: meta,
        shards,
        failures,
    }
}

/// Fill in the grid from the file name or title when it is still unknown.
fn resolve_grid(meta: &mut ImageMetadata) {
    if meta.has_grid() {
        return;
    }
    let grid = parse_grid_token(&meta.path).or_else(|| find_grid_in_title(meta.title()));
    match grid {
        Some((columns, rows)) => meta.set_grid(columns, rows),
        None => tracing::warn!(path = %meta.path, "No grid size in file name or title"),
    }
}
