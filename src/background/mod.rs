mod picture;
mod solid;

pub use picture::{ImageBackground, ResizeMode};
pub use solid::SolidColor;

use crate::config::BackgroundConfig;
use crate::error::{PipelineError, Result};
use crate::segmentation::Mask;
use image::RgbImage;

/// Trait for synthetic backgrounds
pub trait BackgroundEffect {
    /// Produce a background with the frame's dimensions.
    ///
    /// Only the frame's size is used, never its content. The result is
    /// generated fresh on every call.
    fn make_background(&self, frame: &RgbImage) -> RgbImage;
}

/// Build the effect selected in the configuration
pub fn create_effect(config: &BackgroundConfig) -> Result<Box<dyn BackgroundEffect>> {
    match config {
        BackgroundConfig::Solid { color } => Ok(Box::new(SolidColor::new(*color))),
        BackgroundConfig::Image { path, mode } => Ok(Box::new(ImageBackground::open(path, *mode)?)),
    }
}

/// Composites frames against a background effect using a mask
pub struct BackgroundProcessor {
    effect: Box<dyn BackgroundEffect>,
}

impl BackgroundProcessor {
    pub fn new(effect: Box<dyn BackgroundEffect>) -> Self {
        Self { effect }
    }

    /// Keep the frame where the mask is foreground (nonzero), the generated
    /// background elsewhere.
    ///
    /// Returns a new image, distinct from the frame and the background
    /// buffer; neither input is modified. A mask whose size differs from the
    /// frame is rejected.
    pub fn apply(&self, frame: &RgbImage, mask: &Mask) -> Result<RgbImage> {
        let _span = tracing::debug_span!("composite").entered();

        let (width, height) = frame.dimensions();
        let (mask_width, mask_height) = mask.dimensions();
        if (mask_width, mask_height) != (width, height) {
            return Err(PipelineError::MaskSizeMismatch {
                mask_width,
                mask_height,
                frame_width: width,
                frame_height: height,
            });
        }

        let background = self.effect.make_background(frame);
        Ok(RgbImage::from_fn(width, height, |x, y| {
            if mask.is_foreground(x, y) {
                *frame.get_pixel(x, y)
            } else {
                *background.get_pixel(x, y)
            }
        }))
    }
}
