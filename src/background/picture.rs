use super::BackgroundEffect;
use crate::error::{PipelineError, Result};
use image::{imageops, RgbImage};
use std::path::{Path, PathBuf};

/// How a source image is fitted to the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    /// Resize to exactly the frame size, ignoring aspect ratio
    #[default]
    Stretch,
    /// Scale uniformly to cover the frame, then center-crop
    Fill,
}

impl std::str::FromStr for ResizeMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stretch" => Ok(Self::Stretch),
            "fill" => Ok(Self::Fill),
            other => Err(PipelineError::UnsupportedResizeMode(other.to_string())),
        }
    }
}

/// Background taken from a still image, resampled (linear) to every frame's size
#[derive(Debug, Clone)]
pub struct ImageBackground {
    source: RgbImage,
    mode: ResizeMode,
}

impl ImageBackground {
    pub fn new(source: RgbImage, mode: ResizeMode) -> Result<Self> {
        if source.width() == 0 || source.height() == 0 {
            return Err(PipelineError::BackgroundImage {
                path: PathBuf::new(),
                reason: "background image is empty".to_string(),
            });
        }
        Ok(Self { source, mode })
    }

    /// Load the source image from disk
    pub fn open<P: AsRef<Path>>(path: P, mode: ResizeMode) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading background image from {}", path.display());

        let source = image::open(path)
            .map_err(|e| PipelineError::BackgroundImage {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .to_rgb8();

        Self::new(source, mode).map_err(|e| match e {
            PipelineError::BackgroundImage { reason, .. } => PipelineError::BackgroundImage {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn mode(&self) -> ResizeMode {
        self.mode
    }

    fn stretch(&self, width: u32, height: u32) -> RgbImage {
        imageops::resize(&self.source, width, height, imageops::FilterType::Triangle)
    }

    fn fill(&self, width: u32, height: u32) -> RgbImage {
        let (source_width, source_height) = self.source.dimensions();
        let scale = f64::max(
            width as f64 / source_width as f64,
            height as f64 / source_height as f64,
        );

        // Rounding must never leave the scaled image smaller than the frame
        let scaled_width = ((source_width as f64 * scale).round() as u32).max(width);
        let scaled_height = ((source_height as f64 * scale).round() as u32).max(height);

        let scaled = imageops::resize(
            &self.source,
            scaled_width,
            scaled_height,
            imageops::FilterType::Triangle,
        );

        let x0 = (scaled_width - width) / 2;
        let y0 = (scaled_height - height) / 2;
        imageops::crop_imm(&scaled, x0, y0, width, height).to_image()
    }
}

impl BackgroundEffect for ImageBackground {
    fn make_background(&self, frame: &RgbImage) -> RgbImage {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return RgbImage::new(width, height);
        }

        match self.mode {
            ResizeMode::Stretch => self.stretch(width, height),
            ResizeMode::Fill => self.fill(width, height),
        }
    }
}
