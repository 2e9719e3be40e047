mod loopback;

pub use loopback::LoopbackSink;

use anyhow::Result;
use image::RgbImage;

/// Destination for composited frames
pub trait OutputSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// (width, height) frames are delivered at
    fn resolution(&self) -> (u32, u32);
}
