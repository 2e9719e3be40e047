use crate::background::{create_effect, BackgroundProcessor};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::segmentation::{Mask, Segmenter};
use image::RgbImage;

/// Per-frame transform: segment, then composite
///
/// Holds no state between frames beyond the segmenter and processor, so
/// frames of any size may follow each other.
pub struct FramePipeline {
    segmenter: Segmenter,
    processor: BackgroundProcessor,
}

impl FramePipeline {
    pub fn new(segmenter: Segmenter, processor: BackgroundProcessor) -> Self {
        Self {
            segmenter,
            processor,
        }
    }

    /// Resolve the backend and background effect named in the configuration
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let segmenter = Segmenter::new(&config.backend, &config.segmenter)?;
        let processor = BackgroundProcessor::new(create_effect(&config.background)?);
        Ok(Self::new(segmenter, processor))
    }

    pub fn backend_name(&self) -> &'static str {
        self.segmenter.backend_name()
    }

    /// Composite one frame against the background
    pub fn process(&mut self, frame: &RgbImage) -> Result<RgbImage> {
        let _span = tracing::debug_span!("process", width = frame.width(), height = frame.height())
            .entered();

        let mask = self.segmenter.segment(frame)?;
        self.processor.apply(frame, &mask)
    }

    /// Segmentation only, for inspecting masks
    pub fn mask(&mut self, frame: &RgbImage) -> Result<Mask> {
        self.segmenter.segment(frame)
    }
}
