//! Pure Rust image backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::image_dimensions` (header only, no full decode) |
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` |
//! | Crop | `image::DynamicImage::crop_imm` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` with [`Quality`] |
//! | Encode → other | `image::DynamicImage::write_to` by output extension |
//!
//! Crops are encoded in memory, written to a hidden sibling file and renamed
//! into place, so a failed encode or write never leaves a partial file at the
//! output path.

use super::backend::{BackendError, CropOutput, Dimensions, ImageBackend};
use super::params::{CropParams, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Extensions whose decoders are compiled in.
const MAP_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    MAP_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Load and decode an image from disk.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Encode an image in the format implied by `path`'s extension.
fn encode_image(
    img: &DynamicImage,
    path: &Path,
    quality: Quality,
) -> Result<Vec<u8>, BackendError> {
    let format = ImageFormat::from_path(path).map_err(|e| {
        BackendError::ProcessingFailed(format!(
            "Unsupported output format {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
            rgb.write_with_encoder(encoder)
                .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut buf), other).map_err(|e| {
                BackendError::ProcessingFailed(format!("{:?} encode failed: {}", other, e))
            })?;
        }
    }
    Ok(buf)
}

/// Hidden sibling used while writing, e.g. `maps/.keep.0_0.10x10.jpg.partial`.
fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.partial"))
}

/// Write `bytes` to `output` via a temporary sibling and a rename.
fn write_atomically(output: &Path, bytes: &[u8]) -> Result<(), BackendError> {
    let tmp = partial_path(output);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(BackendError::Io(e));
    }
    std::fs::rename(&tmp, output).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        BackendError::Io(e)
    })
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
        let (width, height) = image::image_dimensions(path).map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to read dimensions: {}", e))
        })?;
        Ok(Dimensions { width, height })
    }

    fn crop(&self, params: &CropParams) -> Result<CropOutput, BackendError> {
        let img = load_image(&params.source)?;

        let right = params.x as u64 + params.width as u64;
        let bottom = params.y as u64 + params.height as u64;
        if params.width == 0
            || params.height == 0
            || right > img.width() as u64
            || bottom > img.height() as u64
        {
            return Err(BackendError::ProcessingFailed(format!(
                "Crop region {}x{}+{}+{} outside {}x{} image {}",
                params.width,
                params.height,
                params.x,
                params.y,
                img.width(),
                img.height(),
                params.source.display()
            )));
        }

        let cropped = img.crop_imm(params.x, params.y, params.width, params.height);
        let pixels = cropped.as_bytes().to_vec();
        let encoded = encode_image(&cropped, &params.output, params.quality)?;
        write_atomically(&params.output, &encoded)?;

        Ok(CropOutput {
            dimensions: Dimensions {
                width: cropped.width(),
                height: cropped.height(),
            },
            pixels,
        })
    }
}
