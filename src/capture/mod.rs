mod webcam;

pub use webcam::{CameraConfig, WebcamCapture};

use anyhow::Result;
use image::RgbImage;

/// Source of RGB frames for the pipeline
pub trait CaptureSource {
    /// Block until the next frame is available
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Resolution the source actually delivers
    fn resolution(&self) -> (u32, u32);
}
