//! Shared types serialized between pipeline stages.
//!
//! Both the scan manifest and the processed manifest are a [`Manifest`]: the
//! processed one holds the originals (now probed and annotated) followed by
//! every shard cut from them.

use crate::config::GridConfig;
use crate::metadata::ImageMetadata;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of a manifest inside its stage directory.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub images: Vec<ImageMetadata>,
    #[serde(default)]
    pub config: GridConfig,
}

impl Manifest {
    /// Records that survived probing.
    pub fn usable(&self) -> impl Iterator<Item = &ImageMetadata> {
        self.images.iter().filter(|m| m.is_usable)
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    /// Write pretty JSON, creating the parent directory if needed.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
