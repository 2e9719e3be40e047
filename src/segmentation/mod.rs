mod dense;
mod detector;
mod preprocess;
mod registry;
mod selfie;
pub mod types;
mod yolo;

pub use dense::{ensure_model, AssetFetcher, CategoryModel, DenseClassifierBackend, HttpFetcher};
pub use detector::{rasterize, DetectorBackend, InstanceModel};
pub use preprocess::{Preprocessor, TensorLayout};
pub use registry::{BackendConstructor, BackendRegistry};
pub use selfie::SelfieMulticlassModel;
pub use types::{Detection, Mask, MaskEncoding, Polygon, SegmentationBackend, FOREGROUND};
pub use yolo::YoloSegModel;

use crate::config::SegmenterConfig;
use crate::error::Result;
use image::RgbImage;

/// Uniform `segment(frame) -> mask` facade over one registered backend
pub struct Segmenter {
    backend: Box<dyn SegmentationBackend>,
}

impl Segmenter {
    /// Resolve `name` against the built-in registry
    pub fn new(name: &str, config: &SegmenterConfig) -> Result<Self> {
        Self::with_registry(&BackendRegistry::default(), name, config)
    }

    pub fn with_registry(
        registry: &BackendRegistry,
        name: &str,
        config: &SegmenterConfig,
    ) -> Result<Self> {
        let backend = registry.build(name, config)?;
        tracing::info!("Segmentation backend '{}' ready", backend.name());
        Ok(Self { backend })
    }

    /// Wrap an already constructed backend
    pub fn from_backend(backend: Box<dyn SegmentationBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Forwards to the backend unchanged
    pub fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        self.backend.segment(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use image::{GrayImage, Luma};

    /// Marks the top-left pixel as foreground class 7
    struct Corner;

    impl SegmentationBackend for Corner {
        fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
            let (width, height) = frame.dimensions();
            let mut values = GrayImage::new(width, height);
            values.put_pixel(0, 0, Luma([7]));
            Ok(Mask::categorical(values))
        }

        fn name(&self) -> &'static str {
            "corner"
        }
    }

    fn build_corner(_config: &SegmenterConfig) -> Result<Box<dyn SegmentationBackend>> {
        Ok(Box::new(Corner))
    }

    #[test]
    fn custom_registry_entry_is_selectable() {
        let mut registry = BackendRegistry::empty();
        registry.register("corner", build_corner);

        let mut segmenter =
            Segmenter::with_registry(&registry, "corner", &SegmenterConfig::default()).unwrap();
        assert_eq!(segmenter.backend_name(), "corner");

        let mask = segmenter.segment(&RgbImage::new(4, 3)).unwrap();
        assert_eq!(mask.dimensions(), (4, 3));
        assert_eq!(mask.value(0, 0), 7);
        assert_eq!(mask.foreground_count(), 1);
    }

    #[test]
    fn unknown_backend_constructs_nothing() {
        let result = Segmenter::new("no-such-backend", &SegmenterConfig::default());
        assert!(matches!(result, Err(PipelineError::UnknownBackend { .. })));
    }
}
