//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two pixel operations the pipeline
//! needs: identify (read dimensions) and crop (cut a region and write it out).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate. Tests use the recording `MockBackend` below.

use super::params::CropParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// What a crop produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CropOutput {
    /// Dimensions of the cropped image as written.
    pub dimensions: Dimensions,
    /// Raw decoded pixel buffer of the crop, before encoding.
    pub pixels: Vec<u8>,
}

/// Trait for image processing backends.
///
/// Implementations must be `Sync` so one backend can serve every rayon worker.
pub trait ImageBackend: Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Open `params.source`, crop the region, and write it to `params.output`.
    ///
    /// On error nothing is left at `params.output`.
    fn crop(&self, params: &CropParams) -> Result<CropOutput, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock backend that records operations without touching pixels.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    #[derive(Default)]
    pub struct MockBackend {
        pub identify_results: Mutex<Vec<Dimensions>>,
        /// Fixed answers per path, checked before `identify_results`.
        /// Order-independent, so safe under par_iter.
        pub dimensions_by_path: HashMap<String, Dimensions>,
        pub fail_crops: bool,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify(String),
        Crop {
            source: String,
            output: String,
            x: u32,
            y: u32,
            width: u32,
            height: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Results are popped from the end, so list them in reverse call order.
        pub fn with_dimensions(dims: Vec<Dimensions>) -> Self {
            Self {
                identify_results: Mutex::new(dims),
                ..Self::default()
            }
        }

        pub fn with_path_dimensions(entries: &[(&str, u32, u32)]) -> Self {
            Self {
                dimensions_by_path: entries
                    .iter()
                    .map(|&(path, width, height)| (path.to_string(), Dimensions { width, height }))
                    .collect(),
                ..Self::default()
            }
        }

        pub fn failing_crops() -> Self {
            Self::new().with_failing_crops()
        }

        pub fn with_failing_crops(mut self) -> Self {
            self.fail_crops = true;
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, path: &Path) -> Result<Dimensions, BackendError> {
            let key = path.to_string_lossy().to_string();
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Identify(key.clone()));

            if let Some(dims) = self.dimensions_by_path.get(&key) {
                return Ok(*dims);
            }

            self.identify_results
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| BackendError::ProcessingFailed("No mock dimensions".to_string()))
        }

        fn crop(&self, params: &CropParams) -> Result<CropOutput, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Crop {
                source: params.source.to_string_lossy().to_string(),
                output: params.output.to_string_lossy().to_string(),
                x: params.x,
                y: params.y,
                width: params.width,
                height: params.height,
            });
            if self.fail_crops {
                return Err(BackendError::ProcessingFailed("mock crop failure".into()));
            }
            // Pixels encode the region so distinct crops hash differently.
            let pixels = [params.x, params.y, params.width, params.height]
                .iter()
                .flat_map(|v| v.to_le_bytes())
                .collect();
            Ok(CropOutput {
                dimensions: Dimensions {
                    width: params.width,
                    height: params.height,
                },
                pixels,
            })
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(vec![Dimensions {
            width: 800,
            height: 600,
        }]);

        let result = backend.identify(Path::new("/maps/keep.jpg")).unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], RecordedOp::Identify(p) if p == "/maps/keep.jpg"));
    }

    #[test]
    fn mock_identify_by_path() {
        let backend = MockBackend::with_path_dimensions(&[("a.jpg", 10, 20), ("b.jpg", 30, 40)]);
        assert_eq!(
            backend.identify(Path::new("b.jpg")).unwrap(),
            Dimensions { width: 30, height: 40 }
        );
        assert!(backend.identify(Path::new("c.jpg")).is_err());
    }

    #[test]
    fn mock_identify_exhausted_is_error() {
        let backend = MockBackend::new();
        assert!(backend.identify(Path::new("/maps/keep.jpg")).is_err());
    }

    #[test]
    fn mock_records_crop() {
        let backend = MockBackend::new();
        let out = backend
            .crop(&CropParams {
                source: "/keep.jpg".into(),
                output: "/keep.0_0.10x10.jpg".into(),
                x: 0,
                y: 0,
                width: 320,
                height: 320,
                quality: Default::default(),
            })
            .unwrap();
        assert_eq!(out.dimensions.width, 320);

        let ops = backend.get_operations();
        assert!(matches!(
            &ops[0],
            RecordedOp::Crop {
                width: 320,
                height: 320,
                ..
            }
        ));
    }
}
