//! # gridshard
//!
//! Turns community-posted battle maps into object-detection training data.
//! Each map is a grid of square cells; every interior cell becomes one
//! labelled bounding box. Maps with too many cells to train on are cut into
//! smaller shards first, each of which is a grid map in its own right.
//!
//! # Architecture: Staged Pipeline
//!
//! Like its stages' CLI commands, data moves through JSON manifests you can
//! inspect between steps:
//!
//! ```text
//! 0. Ingest   posts.json  →  maps/                   (feed posts → named image files)
//! 1. Scan     maps/       →  manifest.json           (files → ImageMetadata records)
//! 2. Process  manifest    →  processed/manifest.json (probe, shard, bounding boxes)
//! 3. Export   processed   →  documents.jsonl         (flattened documents)
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`metadata`] | `ImageMetadata`, the record every stage reads and enriches; derived cell size |
//! | [`hash`] | Content hashes used as image uids |
//! | [`bbox`] | Grid geometry → normalized per-cell bounding boxes |
//! | [`shards`] | Shard planning (random windows or fixed tiles) and materialization |
//! | [`naming`] | Grid tokens in file names and titles, shard paths, readable file names |
//! | [`imaging`] | Pure-Rust image backend: identify and crop |
//! | [`feed`] | Feed posts → filtered records → deduplicated files |
//! | [`scan`] | Stage 1: walks the source directory into a manifest |
//! | [`pipeline`] | Stage 2: parallel per-image processing with progress events |
//! | [`export`] | Stage 3: documents, VTT records and batch prediction conversion |
//! | [`config`] | `gridshard.toml` loading, validation and merging |
//! | [`types`] | The manifest shared between stages |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Derived Cell Size
//!
//! Cell width and height are never stored independently of the geometry that
//! defines them. [`metadata::ImageMetadata`] recomputes them on every
//! dimension or grid update, so a record cannot describe a 560 px wide,
//! 14 column map with anything but 40 px cells.
//!
//! ## Injected Randomness
//!
//! Shard sampling takes a `rand::Rng`. The pipeline seeds one generator per
//! image from the configured seed and the image's position, so seeded runs
//! are reproducible regardless of how rayon schedules the work.
//!
//! ## Content-Addressed Identity
//!
//! An original's uid is the hash of its file; a shard's uid is the hash of its
//! decoded pixels. Reposts of the same file collapse to one record, and a
//! shard's identity does not depend on encoder settings.

pub mod bbox;
pub mod config;
pub mod export;
pub mod feed;
pub mod hash;
pub mod imaging;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod scan;
pub mod shards;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
