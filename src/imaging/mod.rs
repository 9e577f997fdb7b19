//! Image processing in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Crop → file** | `crop_imm` + JPEG/PNG/TIFF/WebP encoders |
//!
//! The module is split into:
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Dimension probing on metadata records

pub mod backend;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, CropOutput, Dimensions, ImageBackend};
pub use operations::{Probe, get_dimensions, probe_dimensions};
pub use params::{CropParams, Quality};
pub use rust_backend::{RustBackend, supported_input_extensions};
