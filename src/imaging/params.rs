//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how*. They sit between the
//! shard materializer (which decides which region to cut and where it goes)
//! and the [`backend`](super::backend) (which does the pixel work), so the
//! backend can be swapped for a mock in tests.
//!
//! - [`Quality`]: JPEG encoding quality (1–100, default 90). Clamped on construction.
//! - [`CropParams`]: source, output path, pixel region, quality.

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Parameters for a crop operation. The region is in source pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct CropParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub quality: Quality,
}
