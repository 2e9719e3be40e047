use super::detector::InstanceModel;
use super::preprocess::{Preprocessor, TensorLayout};
use super::types::{Detection, Polygon};
use crate::config::DetectorConfig;
use crate::error::{PipelineError, Result};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use std::path::Path;

/// YOLO instance segmentation model exported to ONNX
///
/// Expects two outputs: detections `[1, 4 + classes + coeffs, anchors]`
/// (or its transpose) and mask prototypes `[1, coeffs, mh, mw]`.
pub struct YoloSegModel {
    session: Session,
    preprocessor: Preprocessor,
    params: DecodeParams,
}

impl YoloSegModel {
    pub fn new<P: AsRef<Path>>(model_path: P, config: &DetectorConfig) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading detector model from {}", path.display());

        if !path.is_file() {
            return Err(PipelineError::model_load(path, "weights file not found"));
        }

        let session = Session::builder()
            .map_err(|e| PipelineError::model_load(path, e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PipelineError::model_load(path, e))?
            .with_intra_threads(4)
            .map_err(|e| PipelineError::model_load(path, e))?
            .commit_from_file(path)
            .map_err(|e| PipelineError::model_load(path, e))?;

        tracing::info!("Detector model loaded successfully");

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(config.input_size, config.input_size, TensorLayout::Nchw),
            params: DecodeParams::from(config),
        })
    }
}

impl InstanceModel for YoloSegModel {
    fn predict(&mut self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let input = self.preprocessor.preprocess(frame);
        let input_tensor =
            TensorRef::from_array_view(input.view()).map_err(PipelineError::inference)?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(PipelineError::inference)?;
        drop(_infer_span);

        if outputs.len() < 2 {
            return Err(PipelineError::inference(format!(
                "expected detection and prototype outputs, got {} output(s)",
                outputs.len()
            )));
        }

        let (det_shape, det_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(PipelineError::inference)?;
        let (proto_shape, proto_data) = outputs[1]
            .try_extract_tensor::<f32>()
            .map_err(PipelineError::inference)?;

        let det = RawTensor {
            dims: det_shape.as_ref().iter().map(|&d| d as usize).collect(),
            data: det_data,
        };
        let proto = RawTensor {
            dims: proto_shape.as_ref().iter().map(|&d| d as usize).collect(),
            data: proto_data,
        };

        decode(&det, &proto, &self.params, frame.dimensions())
    }
}

pub(crate) struct RawTensor<'a> {
    pub dims: Vec<usize>,
    pub data: &'a [f32],
}

#[derive(Debug, Clone)]
pub(crate) struct DecodeParams {
    pub classes: Vec<u32>,
    pub confidence: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
}

impl From<&DetectorConfig> for DecodeParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            classes: config.classes.clone(),
            confidence: config.confidence,
            iou_threshold: config.iou_threshold,
            input_size: config.input_size,
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    class_id: u32,
    score: f32,
    /// x0, y0, x1, y1 in model input pixels
    bbox: [f32; 4],
    coeffs: Vec<f32>,
}

/// Turn raw YOLO-seg outputs into detections whose polygons are in frame
/// coordinates, ordered by descending confidence
pub(crate) fn decode(
    det: &RawTensor<'_>,
    proto: &RawTensor<'_>,
    params: &DecodeParams,
    frame_size: (u32, u32),
) -> Result<Vec<Detection>> {
    let _span = tracing::debug_span!("decode").entered();

    if det.dims.len() != 3 || proto.dims.len() != 4 {
        return Err(PipelineError::inference(format!(
            "unexpected output ranks: detections {:?}, prototypes {:?}",
            det.dims, proto.dims
        )));
    }

    let coeff_count = proto.dims[1];
    let (mask_height, mask_width) = (proto.dims[2], proto.dims[3]);
    if proto.data.len() < coeff_count * mask_height * mask_width {
        return Err(PipelineError::inference("prototype tensor is truncated"));
    }

    // Exports differ on whether anchors or features come first
    let transposed = det.dims[1] > det.dims[2];
    let (features, anchors) = if transposed {
        (det.dims[2], det.dims[1])
    } else {
        (det.dims[1], det.dims[2])
    };
    if features <= 4 + coeff_count {
        return Err(PipelineError::inference(format!(
            "detection tensor has {features} features, too few for {coeff_count} mask coefficients"
        )));
    }
    if det.data.len() < features * anchors {
        return Err(PipelineError::inference("detection tensor is truncated"));
    }
    let class_count = features - 4 - coeff_count;

    let feature = |anchor: usize, index: usize| {
        if transposed {
            det.data[anchor * features + index]
        } else {
            det.data[index * anchors + anchor]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, score) = (0..class_count)
            .map(|c| (c as u32, feature(anchor, 4 + c)))
            .fold((0, f32::MIN), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            });

        if score < params.confidence || !params.classes.contains(&class_id) {
            continue;
        }

        let (cx, cy) = (feature(anchor, 0), feature(anchor, 1));
        let (w, h) = (feature(anchor, 2), feature(anchor, 3));
        candidates.push(Candidate {
            class_id,
            score,
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            coeffs: (0..coeff_count)
                .map(|k| feature(anchor, 4 + class_count + k))
                .collect(),
        });
    }

    let kept = non_max_suppression(candidates, params.iou_threshold);
    tracing::debug!("{} detections after NMS", kept.len());

    let (frame_width, frame_height) = frame_size;
    let scale_x = frame_width as f32 / mask_width as f32;
    let scale_y = frame_height as f32 / mask_height as f32;
    let proto_scale_x = mask_width as f32 / params.input_size as f32;
    let proto_scale_y = mask_height as f32 / params.input_size as f32;

    let detections = kept
        .into_iter()
        .filter_map(|candidate| {
            let region = [
                candidate.bbox[0] * proto_scale_x,
                candidate.bbox[1] * proto_scale_y,
                candidate.bbox[2] * proto_scale_x,
                candidate.bbox[3] * proto_scale_y,
            ];
            let mask = instance_mask(&candidate.coeffs, proto.data, mask_width, mask_height, region);
            let outline = largest_outline(&mask)?;
            let points = outline
                .into_iter()
                .map(|p| {
                    Point::new(
                        (p.x as f32 * scale_x).round() as i32,
                        (p.y as f32 * scale_y).round() as i32,
                    )
                })
                .collect();

            Some(Detection {
                class_id: candidate.class_id,
                confidence: candidate.score,
                polygon: Polygon::new(points, Some(candidate.class_id)),
            })
        })
        .collect();

    Ok(detections)
}

/// Greedy per-class NMS; survivors come back sorted by descending score
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Combine prototypes with one detection's coefficients, cropped to its box.
/// sigmoid(v) >= 0.5 exactly when v >= 0.
fn instance_mask(
    coeffs: &[f32],
    prototypes: &[f32],
    width: usize,
    height: usize,
    region: [f32; 4],
) -> GrayImage {
    let plane = width * height;
    let x0 = region[0].floor().clamp(0.0, width as f32) as usize;
    let y0 = region[1].floor().clamp(0.0, height as f32) as usize;
    let x1 = region[2].ceil().clamp(0.0, width as f32) as usize;
    let y1 = region[3].ceil().clamp(0.0, height as f32) as usize;

    let mut mask = GrayImage::new(width as u32, height as u32);
    for y in y0..y1 {
        for x in x0..x1 {
            let index = y * width + x;
            let logit: f32 = coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| c * prototypes[k * plane + index])
                .sum();
            if logit >= 0.0 {
                mask.put_pixel(x as u32, y as u32, Luma([255]));
            }
        }
    }
    mask
}

fn largest_outline(mask: &GrayImage) -> Option<Vec<Point<i32>>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .max_by_key(|contour| contour.points.len())
        .map(|contour| contour.points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::detector::rasterize;
    use crate::segmentation::MaskEncoding;

    fn params(classes: Vec<u32>) -> DecodeParams {
        DecodeParams {
            classes,
            confidence: 0.25,
            iou_threshold: 0.7,
            input_size: 4,
        }
    }

    /// Features-first detection tensor with 2 classes and 1 mask coefficient
    fn detections(anchors: &[[f32; 7]]) -> (Vec<usize>, Vec<f32>) {
        let n = anchors.len();
        let mut data = vec![0.0; 7 * n];
        for (a, values) in anchors.iter().enumerate() {
            for (f, value) in values.iter().enumerate() {
                data[f * n + a] = *value;
            }
        }
        (vec![1, 7, n], data)
    }

    #[test]
    fn decodes_person_and_drops_other_classes() {
        let (det_dims, det_data) = detections(&[
            // cx, cy, w, h, person, car, coeff
            [2.0, 2.0, 4.0, 4.0, 0.9, 0.1, 1.0],
            [2.0, 2.0, 4.0, 4.0, 0.1, 0.8, 1.0],
        ]);
        let proto_data = vec![1.0; 16];
        let det = RawTensor { dims: det_dims, data: &det_data };
        let proto = RawTensor { dims: vec![1, 1, 4, 4], data: &proto_data };

        let found = decode(&det, &proto, &params(vec![0]), (8, 8)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 0);

        let mask = rasterize(8, 8, [&found[0].polygon], MaskEncoding::Binary);
        assert!(mask.is_foreground(3, 3));
        assert!(mask.is_foreground(0, 0));
        assert!(!mask.is_foreground(7, 7));
    }

    #[test]
    fn below_threshold_yields_nothing() {
        let (det_dims, det_data) = detections(&[[2.0, 2.0, 4.0, 4.0, 0.2, 0.0, 1.0]]);
        let proto_data = vec![1.0; 16];
        let det = RawTensor { dims: det_dims, data: &det_data };
        let proto = RawTensor { dims: vec![1, 1, 4, 4], data: &proto_data };

        assert!(decode(&det, &proto, &params(vec![0]), (8, 8))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn negative_prototype_response_produces_no_polygon() {
        let (det_dims, det_data) = detections(&[[2.0, 2.0, 4.0, 4.0, 0.9, 0.0, -1.0]]);
        let proto_data = vec![1.0; 16];
        let det = RawTensor { dims: det_dims, data: &det_data };
        let proto = RawTensor { dims: vec![1, 1, 4, 4], data: &proto_data };

        assert!(decode(&det, &proto, &params(vec![0]), (8, 8))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn overlapping_same_class_boxes_are_suppressed() {
        let candidate = |score: f32, shift: f32| Candidate {
            class_id: 0,
            score,
            bbox: [shift, shift, 10.0 + shift, 10.0 + shift],
            coeffs: Vec::new(),
        };
        let kept = non_max_suppression(
            vec![candidate(0.5, 0.0), candidate(0.9, 0.5), candidate(0.7, 20.0)],
            0.7,
        );
        let scores: Vec<f32> = kept.iter().map(|c| c.score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn rejects_malformed_outputs() {
        let det = RawTensor { dims: vec![1, 5], data: &[] };
        let proto = RawTensor { dims: vec![1, 1, 4, 4], data: &[] };
        let err = decode(&det, &proto, &params(vec![0]), (8, 8)).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
    }
}
