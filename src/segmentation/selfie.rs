use super::dense::CategoryModel;
use super::preprocess::{Preprocessor, TensorLayout};
use crate::config::DenseClassifierConfig;
use crate::error::{PipelineError, Result};
use image::{GrayImage, Luma, RgbImage};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use std::path::Path;

/// Probability above which a single-channel output counts as foreground
const FOREGROUND_THRESHOLD: f32 = 0.5;

/// Selfie segmentation model exported to ONNX
///
/// Input is an NHWC image in [0, 1]; output holds per-class confidences,
/// either channels-last `[1, H, W, C]` or channels-first `[1, C, H, W]`.
/// Multi-class outputs are reduced with argmax, single-channel ones are
/// thresholded into {0, 1}.
pub struct SelfieMulticlassModel {
    session: Session,
    preprocessor: Preprocessor,
}

impl SelfieMulticlassModel {
    pub fn new<P: AsRef<Path>>(model_path: P, config: &DenseClassifierConfig) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading dense classifier model from {}", path.display());

        let session = Session::builder()
            .map_err(|e| PipelineError::model_load(path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PipelineError::model_load(path, e))?
            .commit_from_file(path)
            .map_err(|e| PipelineError::model_load(path, e))?;

        tracing::info!("Dense classifier model loaded successfully");

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(config.input_size, config.input_size, TensorLayout::Nhwc),
        })
    }
}

impl CategoryModel for SelfieMulticlassModel {
    fn categorize(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        let input = self.preprocessor.preprocess(frame);
        let input_tensor =
            TensorRef::from_array_view(input.view()).map_err(PipelineError::inference)?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(PipelineError::inference)?;
        drop(_infer_span);

        require_confidence_output(outputs.len())?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(PipelineError::inference)?;
        let dims: Vec<usize> = shape.as_ref().iter().map(|&d| d as usize).collect();

        let categories = argmax_categories(&dims, data)?;
        let (width, height) = frame.dimensions();
        Ok(Preprocessor::postprocess_categories(categories, width, height))
    }
}

fn require_confidence_output(count: usize) -> Result<()> {
    if count == 0 {
        return Err(PipelineError::inference(
            "expected a confidence output, model produced none",
        ));
    }
    Ok(())
}

/// Reduce a confidence tensor to a category id map at model resolution
pub(crate) fn argmax_categories(dims: &[usize], data: &[f32]) -> Result<GrayImage> {
    if dims.len() != 4 {
        return Err(PipelineError::inference(format!(
            "expected a 4-D confidence tensor, got {dims:?}"
        )));
    }

    // The class axis is the short one
    let channels_last = dims[3] < dims[1].min(dims[2]);
    let (height, width, classes) = if channels_last {
        (dims[1], dims[2], dims[3])
    } else {
        (dims[2], dims[3], dims[1])
    };
    if classes == 0 || data.len() < height * width * classes {
        return Err(PipelineError::inference(format!(
            "confidence tensor {dims:?} holds {} values",
            data.len()
        )));
    }

    let plane = height * width;
    let score = |pixel: usize, class: usize| {
        if channels_last {
            data[pixel * classes + class]
        } else {
            data[class * plane + pixel]
        }
    };

    Ok(GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let pixel = y as usize * width + x as usize;
        let category = if classes == 1 {
            u8::from(score(pixel, 0) > FOREGROUND_THRESHOLD)
        } else {
            (0..classes)
                .max_by(|&a, &b| score(pixel, a).total_cmp(&score(pixel, b)))
                .unwrap_or(0)
                .min(u8::MAX as usize) as u8
        };
        Luma([category])
    }))
}
