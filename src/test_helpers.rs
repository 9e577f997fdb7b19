//! Shared test utilities for the gridshard test suite.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! create_test_jpeg(&tmp.path().join("keep.20x20.jpg"), 640, 640);
//! let manifest = scan(tmp.path(), GridConfig::default(), &[]).unwrap();
//!
//! let keep = find_image(&manifest, "keep");
//! assert_eq!(keep.columns(), 20);
//! ```

use crate::metadata::ImageMetadata;
use crate::types::Manifest;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, Rgb};
use std::path::Path;

// =========================================================================
// Fixture images
// =========================================================================

/// Write a JPEG with a position-dependent gradient to `path`.
///
/// The file is JPEG-encoded whatever its extension. The gradient makes every
/// crop of it differ from its neighbours, so shard hashes are distinct.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, 90)
        .encode_image(&img)
        .unwrap();
    std::fs::write(path, buf).unwrap();
}

// =========================================================================
// Manifest lookups, panicking with a clear message on miss
// =========================================================================

/// Find an image by title. Panics if not found.
pub fn find_image<'a>(manifest: &'a Manifest, title: &str) -> &'a ImageMetadata {
    manifest
        .images
        .iter()
        .find(|m| m.title() == title)
        .unwrap_or_else(|| {
            let titles: Vec<&str> = manifest.images.iter().map(|m| m.title()).collect();
            panic!("image '{title}' not found. Available: {titles:?}")
        })
}

/// All shard records cut from the image with uid `parent_uid`.
pub fn shards_of<'a>(manifest: &'a Manifest, parent_uid: &str) -> Vec<&'a ImageMetadata> {
    manifest
        .images
        .iter()
        .filter(|m| m.is_shard && m.parent_uid == parent_uid)
        .collect()
}
