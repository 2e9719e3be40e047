//! Explicit configuration for every pipeline stage.
//!
//! Defaults are resolved once (usually from CLI arguments in `main`) and passed
//! into constructors; nothing in the library reads global paths.

use crate::background::ResizeMode;
use crate::segmentation::MaskEncoding;
use image::Rgb;
use std::path::{Path, PathBuf};

/// Default directory holding segmentation weights
pub const DEFAULT_WEIGHTS_DIR: &str = "weights/segmentation";

/// Default detector weights file, looked up inside the weights directory
pub const DEFAULT_DETECTOR_WEIGHTS: &str = "yolo11n-seg.onnx";

/// Remote asset fetched when the dense classifier has no local weights
pub const DEFAULT_DENSE_MODEL_URL: &str = "https://storage.googleapis.com/mediapipe-models/image_segmenter/selfie_multiclass_256x256/float32/latest/selfie_multiclass_256x256.tflite";

/// COCO class id of "person"
pub const PERSON_CLASS: u32 = 0;

#[derive(Debug, Clone)]
pub struct WeightsConfig {
    pub dir: PathBuf,
}

impl WeightsConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn join(&self, file_name: impl AsRef<Path>) -> PathBuf {
        self.dir.join(file_name)
    }
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WEIGHTS_DIR)
    }
}

/// Detector (instance segmentation) strategy parameters
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Weights path. `None` means `<weights dir>/yolo11n-seg.onnx`.
    pub model_path: Option<PathBuf>,
    /// Class ids kept after decoding
    pub classes: Vec<u32>,
    /// Minimum detection confidence
    pub confidence: f32,
    /// IoU above which same-class detections are suppressed
    pub iou_threshold: f32,
    /// Square model input size in pixels
    pub input_size: u32,
    pub encoding: MaskEncoding,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            classes: vec![PERSON_CLASS],
            confidence: 0.25,
            iou_threshold: 0.7,
            input_size: 640,
            encoding: MaskEncoding::Binary,
        }
    }
}

/// Dense classifier (per-pixel category) strategy parameters
#[derive(Debug, Clone)]
pub struct DenseClassifierConfig {
    /// Weights path. When missing, the remote asset is fetched.
    pub model_path: Option<PathBuf>,
    pub model_url: String,
    /// Square model input size in pixels
    pub input_size: u32,
}

impl Default for DenseClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            model_url: DEFAULT_DENSE_MODEL_URL.to_string(),
            input_size: 256,
        }
    }
}

impl DenseClassifierConfig {
    /// File name of the remote asset, i.e. the last URL path segment
    pub fn remote_file_name(&self) -> &str {
        let path = self
            .model_url
            .split(['?', '#'])
            .next()
            .unwrap_or(&self.model_url);
        path.rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("model.onnx")
    }

    /// Location a fetched asset is written to
    pub fn download_path(&self, weights: &WeightsConfig) -> PathBuf {
        weights.join(self.remote_file_name())
    }
}

/// Everything a segmentation backend constructor may need
#[derive(Debug, Clone, Default)]
pub struct SegmenterConfig {
    pub weights: WeightsConfig,
    pub detector: DetectorConfig,
    pub dense: DenseClassifierConfig,
}

impl SegmenterConfig {
    pub fn detector_model_path(&self) -> PathBuf {
        self.detector
            .model_path
            .clone()
            .unwrap_or_else(|| self.weights.join(DEFAULT_DETECTOR_WEIGHTS))
    }
}

/// Background effect selection
#[derive(Debug, Clone)]
pub enum BackgroundConfig {
    Solid { color: Rgb<u8> },
    Image { path: PathBuf, mode: ResizeMode },
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self::Solid {
            color: Rgb([0, 0, 0]),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Registered backend name, e.g. "detector" or "dense-classifier"
    pub backend: String,
    pub segmenter: SegmenterConfig,
    pub background: BackgroundConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_file_name_is_last_url_segment() {
        let config = DenseClassifierConfig::default();
        assert_eq!(
            config.remote_file_name(),
            "selfie_multiclass_256x256.tflite"
        );

        let config = DenseClassifierConfig {
            model_url: "https://example.com/models/seg.onnx?download=1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.remote_file_name(), "seg.onnx");
    }

    #[test]
    fn detector_path_defaults_into_weights_dir() {
        let config = SegmenterConfig {
            weights: WeightsConfig::new("/tmp/w"),
            ..Default::default()
        };
        assert_eq!(
            config.detector_model_path(),
            PathBuf::from("/tmp/w/yolo11n-seg.onnx")
        );
    }
}
