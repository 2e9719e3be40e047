use super::CaptureSource;
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

/// Camera selection and requested stream format
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Webcam frames, already converted to RGB
pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    pub fn open(config: &CameraConfig) -> Result<Self> {
        tracing::info!(
            "Opening webcam {} at {}x{}@{}",
            config.device_index,
            config.width,
            config.height,
            config.fps
        );

        let index = CameraIndex::Index(config.device_index);
        let format = CameraFormat::new(
            Resolution::new(config.width, config.height),
            FrameFormat::MJPEG,
            config.fps,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;
        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        let (width, height) = (resolution.width(), resolution.height());
        if (width, height) != (config.width, config.height) {
            tracing::warn!(
                "Camera delivers {}x{} instead of the requested {}x{}",
                width,
                height,
                config.width,
                config.height
            );
        }

        tracing::info!("Webcam stream open at {}x{}", width, height);

        Ok(Self {
            camera,
            width,
            height,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let buffer = self.camera.frame().context("Failed to read frame")?;

        buffer
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}
