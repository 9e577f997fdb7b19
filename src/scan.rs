//! Filesystem scanning and manifest generation.
//!
//! Stage 1 of the pipeline. Walks the source directory for map images and
//! produces one [`ImageMetadata`] per distinct image.
//!
//! ## Directory Structure
//!
//! ```text
//! maps/                                   # Source root
//! ├── gridshard.toml                      # Configuration (optional)
//! ├── canal_street_rain.14x20.jpg         # Grid size in the name
//! ├── old_watermill.30x45.jpg
//! ├── old_watermill.0_120.20x20.30x45.jpg # Shard from an earlier run, skipped
//! └── dungeons/
//!     └── unmarked_mine.35x49.png
//! ```
//!
//! ## Rules
//!
//! - Files are visited in sorted path order, so the manifest is stable.
//! - Hidden files and directories (leading `.`) are skipped.
//! - Shard files written by the process stage are skipped.
//! - The uid is the hash of the file bytes; a file whose bytes match an
//!   earlier one is a duplicate and skipped.
//! - The grid comes from the `.<cols>x<rows>.` name token, the title from
//!   the first name segment.
//! - A file whose uid matches a record in `known` (e.g. from ingestion)
//!   keeps that record's provenance.

use crate::config::GridConfig;
use crate::hash::hash_file;
use crate::imaging::supported_input_extensions;
use crate::metadata::{ImageMetadata, MetadataOverrides};
use crate::naming::{is_shard_path, parse_map_stem};
use crate::types::Manifest;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

pub fn scan(
    root: &Path,
    config: GridConfig,
    known: &[ImageMetadata],
) -> Result<Manifest, ScanError> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_image(entry.path()) {
            continue;
        }
        let path = entry.path().to_string_lossy().into_owned();
        if is_shard_path(&path) {
            tracing::debug!(%path, "Skipping shard file");
            continue;
        }

        let uid = hash_file(entry.path())?;
        if !seen.insert(uid.clone()) {
            tracing::info!(%path, "Duplicate image, skipping");
            continue;
        }

        images.push(build_record(entry.path(), path, uid, known));
    }

    Ok(Manifest { images, config })
}

fn build_record(file: &Path, path: String, uid: String, known: &[ImageMetadata]) -> ImageMetadata {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let parsed = parse_map_stem(&stem);
    let (columns, rows) = parsed.grid.unzip();

    let overrides = MetadataOverrides {
        path: Some(path),
        uid: Some(uid.clone()),
        columns,
        rows,
        ..Default::default()
    };

    match known.iter().find(|k| k.uid == uid) {
        Some(k) => {
            ImageMetadata::with_overrides(k.source_url(), k.source_id(), k.title(), overrides)
        }
        None => ImageMetadata::with_overrides("", "", parsed.display_title, overrides),
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .is_some_and(|e| supported_input_extensions().contains(&e.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::content_hash;
    use crate::test_helpers::{create_test_jpeg, find_image};
    use std::fs;
    use tempfile::TempDir;

    fn scan_dir(root: &Path) -> Manifest {
        scan(root, GridConfig::default(), &[]).unwrap()
    }

    #[test]
    fn scan_finds_images_with_grid_and_title() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("canal_street.14x20.jpg"), 56, 80);
        create_test_jpeg(&tmp.path().join("old-watermill.jpg"), 30, 30);

        let manifest = scan_dir(tmp.path());
        assert_eq!(manifest.images.len(), 2);

        let canal = find_image(&manifest, "canal street");
        assert_eq!((canal.columns(), canal.rows()), (14, 20));
        assert_eq!(canal.uid, hash_file(Path::new(&canal.path)).unwrap());
        assert!(canal.path.ends_with("canal_street.14x20.jpg"));

        let mill = find_image(&manifest, "old watermill");
        assert!(!mill.has_grid());
    }

    #[test]
    fn scan_is_sorted_and_recursive() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dungeons")).unwrap();
        create_test_jpeg(&tmp.path().join("b_keep.20x20.jpg"), 20, 20);
        create_test_jpeg(&tmp.path().join("a_mill.10x10.jpg"), 10, 10);
        create_test_jpeg(&tmp.path().join("dungeons/mine.35x49.jpg"), 35, 49);

        let titles: Vec<String> = scan_dir(tmp.path())
            .images
            .iter()
            .map(|m| m.title().to_string())
            .collect();
        assert_eq!(titles, vec!["a mill", "b keep", "mine"]);
    }

    #[test]
    fn scan_skips_duplicates_by_content() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("a.10x10.jpg"), 10, 10);
        fs::copy(tmp.path().join("a.10x10.jpg"), tmp.path().join("b.10x10.jpg")).unwrap();

        let manifest = scan_dir(tmp.path());
        assert_eq!(manifest.images.len(), 1);
        assert_eq!(manifest.images[0].title(), "a");
    }

    #[test]
    fn scan_skips_shards_hidden_and_non_images() {
        let tmp = TempDir::new().unwrap();
        create_test_jpeg(&tmp.path().join("keep.20x20.jpg"), 20, 20);
        create_test_jpeg(&tmp.path().join("keep.0_10.5x5.20x20.jpg"), 5, 5);
        create_test_jpeg(&tmp.path().join(".keep.1_1.5x5.jpg.partial"), 5, 5);
        fs::create_dir(tmp.path().join(".cache")).unwrap();
        create_test_jpeg(&tmp.path().join(".cache/other.10x10.jpg"), 10, 10);
        fs::write(tmp.path().join("notes.txt"), "not an image").unwrap();
        fs::write(tmp.path().join("gridshard.toml"), "").unwrap();

        let manifest = scan_dir(tmp.path());
        assert_eq!(manifest.images.len(), 1);
        assert_eq!(manifest.images[0].title(), "keep");
    }

    #[test]
    fn scan_keeps_known_provenance() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("unmarked_mine.35x49.jpg");
        create_test_jpeg(&path, 35, 49);
        let bytes = fs::read(&path).unwrap();

        let mut known = ImageMetadata::new(
            "https://i.redd.it/mine.jpeg",
            "a1",
            "Unmarked Mine [35x49] - Battlemap",
        );
        known.uid = content_hash(&bytes);

        let manifest = scan(tmp.path(), GridConfig::default(), &[known]).unwrap();
        let meta = &manifest.images[0];
        assert_eq!(meta.title(), "Unmarked Mine [35x49] - Battlemap");
        assert_eq!(meta.source_id(), "a1");
        assert_eq!((meta.columns(), meta.rows()), (35, 49));
    }

    #[test]
    fn scan_carries_config() {
        let tmp = TempDir::new().unwrap();
        let mut config = GridConfig::default();
        config.shards.count = 9;
        let manifest = scan(tmp.path(), config.clone(), &[]).unwrap();
        assert!(manifest.images.is_empty());
        assert_eq!(manifest.config, config);
    }
}
