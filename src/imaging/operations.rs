//! High-level image operations on metadata records.
//!
//! These functions combine a backend call with the bookkeeping the pipeline
//! needs on the [`ImageMetadata`] record.

use super::backend::{BackendError, ImageBackend};
use crate::metadata::ImageMetadata;
use std::path::Path;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Get image dimensions using the backend.
pub fn get_dimensions(backend: &impl ImageBackend, path: &Path) -> Result<(u32, u32)> {
    let dims = backend.identify(path)?;
    Ok((dims.width, dims.height))
}

/// Outcome of probing a record's file for its pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Dimensions were read and stored on the record.
    Usable(u32, u32),
    /// The probe failed or returned a zero dimension; the record is now unusable.
    Unusable,
}

/// Read the record's file dimensions and store them.
///
/// A missing path, a backend failure, or a zero width or height marks the
/// record unusable instead of failing, so a batch can continue past one bad
/// image.
pub fn probe_dimensions(backend: &impl ImageBackend, meta: &mut ImageMetadata) -> Probe {
    if meta.path.is_empty() {
        tracing::warn!(title = %meta.title(), "No local file to probe");
        meta.mark_unusable();
        return Probe::Unusable;
    }
    match get_dimensions(backend, Path::new(&meta.path)) {
        Ok((w, h)) if w > 0 && h > 0 => {
            meta.set_dimensions(w, h);
            Probe::Usable(w, h)
        }
        Ok((w, h)) => {
            tracing::warn!(path = %meta.path, width = w, height = h, "Image has zero dimension");
            meta.set_dimensions(w, h);
            meta.mark_unusable();
            Probe::Unusable
        }
        Err(e) => {
            tracing::warn!(path = %meta.path, error = %e, "Failed to read image dimensions");
            meta.mark_unusable();
            Probe::Unusable
        }
    }
}
