use super::types::{Detection, Mask, MaskEncoding, Polygon, SegmentationBackend};
use crate::config::DetectorConfig;
use crate::error::Result;
use image::RgbImage;
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

/// Instance segmentation model producing outlined detections
///
/// Implemented by the ONNX YOLO-seg runner; tests substitute canned output.
pub trait InstanceModel {
    /// Detections in model output order, with polygons in frame coordinates
    fn predict(&mut self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

/// Detector-based strategy: rasterizes the polygon of every accepted
/// detection into the mask.
///
/// Later detections overwrite earlier ones where they overlap.
pub struct DetectorBackend<M> {
    model: M,
    classes: Vec<u32>,
    confidence: f32,
    encoding: MaskEncoding,
}

impl<M: InstanceModel> DetectorBackend<M> {
    pub fn new(model: M, config: &DetectorConfig) -> Self {
        Self {
            model,
            classes: config.classes.clone(),
            confidence: config.confidence,
            encoding: config.encoding,
        }
    }

    fn accepts(&self, detection: &Detection) -> bool {
        detection.confidence >= self.confidence && self.classes.contains(&detection.class_id)
    }
}

impl<M: InstanceModel> SegmentationBackend for DetectorBackend<M> {
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask> {
        let _span = tracing::debug_span!("detector_segment").entered();

        let detections = self.model.predict(frame)?;
        let accepted: Vec<&Polygon> = detections
            .iter()
            .filter(|d| self.accepts(d))
            .map(|d| &d.polygon)
            .collect();

        tracing::debug!(
            "{} of {} detections accepted",
            accepted.len(),
            detections.len()
        );

        let (width, height) = frame.dimensions();
        Ok(rasterize(width, height, accepted, self.encoding))
    }

    fn name(&self) -> &'static str {
        "detector"
    }
}

/// Fill polygons into a fresh mask of the given size, in order.
///
/// Binary masks get 255 for every polygon; categorical masks get
/// `class_id + 1` so that 0 stays "no detection".
pub fn rasterize<'a>(
    width: u32,
    height: u32,
    polygons: impl IntoIterator<Item = &'a Polygon>,
    encoding: MaskEncoding,
) -> Mask {
    let _span = tracing::debug_span!("rasterize").entered();

    let mut mask = Mask::empty(width, height, encoding);
    if width == 0 || height == 0 {
        return mask;
    }

    for polygon in polygons {
        let outline = open_outline(&polygon.points);
        if outline.len() < 3 {
            continue;
        }
        let color = mask.fill_value(polygon.class_id.unwrap_or(0));
        draw_polygon_mut(mask.values_mut(), &outline, color);
    }

    mask
}

/// Drop repeated vertices and the closing vertex; imageproc rejects
/// outlines whose first and last points coincide.
fn open_outline(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let mut outline: Vec<Point<i32>> = Vec::with_capacity(points.len());
    for &point in points {
        if outline.last() != Some(&point) {
            outline.push(point);
        }
    }
    while outline.len() > 1 && outline.first() == outline.last() {
        outline.pop();
    }
    outline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    struct CannedModel(Vec<Detection>);

    impl InstanceModel for CannedModel {
        fn predict(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    struct FailingModel;

    impl InstanceModel for FailingModel {
        fn predict(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>> {
            Err(PipelineError::Inference("model crashed".to_string()))
        }
    }

    fn square(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    }

    fn detection(class_id: u32, confidence: f32, points: Vec<Point<i32>>) -> Detection {
        Detection {
            class_id,
            confidence,
            polygon: Polygon::new(points, Some(class_id)),
        }
    }

    fn config(classes: Vec<u32>, encoding: MaskEncoding) -> DetectorConfig {
        DetectorConfig {
            classes,
            encoding,
            ..Default::default()
        }
    }

    #[test]
    fn no_detections_yield_empty_mask() {
        let mut backend = DetectorBackend::new(
            CannedModel(Vec::new()),
            &config(vec![0], MaskEncoding::Binary),
        );
        for (width, height) in [(1, 1), (7, 3), (32, 17)] {
            let mask = backend.segment(&RgbImage::new(width, height)).unwrap();
            assert_eq!(mask.dimensions(), (width, height));
            assert_eq!(mask.foreground_count(), 0);
        }
    }

    #[test]
    fn accepted_polygon_is_filled_with_255() {
        let mut backend = DetectorBackend::new(
            CannedModel(vec![detection(0, 0.9, square(1, 1, 4, 4))]),
            &config(vec![0], MaskEncoding::Binary),
        );
        let mask = backend.segment(&RgbImage::new(8, 8)).unwrap();

        assert_eq!(mask.dimensions(), (8, 8));
        assert_eq!(mask.value(2, 2), 255);
        assert_eq!(mask.value(1, 1), 255);
        assert_eq!(mask.value(0, 0), 0);
        assert_eq!(mask.value(6, 6), 0);
    }

    #[test]
    fn filters_by_confidence_and_class() {
        let detections = vec![
            detection(0, 0.1, square(0, 0, 3, 3)),
            detection(2, 0.9, square(4, 4, 7, 7)),
        ];
        let mut backend = DetectorBackend::new(
            CannedModel(detections),
            &config(vec![0], MaskEncoding::Binary),
        );
        let mask = backend.segment(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(mask.foreground_count(), 0);
    }

    #[test]
    fn categorical_overlap_is_last_write_wins() {
        let detections = vec![
            detection(0, 0.9, square(0, 0, 5, 5)),
            detection(2, 0.8, square(3, 3, 7, 7)),
        ];
        let mut backend = DetectorBackend::new(
            CannedModel(detections),
            &config(vec![0, 2], MaskEncoding::Categorical),
        );
        let mask = backend.segment(&RgbImage::new(8, 8)).unwrap();

        assert_eq!(mask.encoding(), MaskEncoding::Categorical);
        assert_eq!(mask.value(1, 1), 1);
        assert_eq!(mask.value(4, 4), 3);
        assert_eq!(mask.value(6, 6), 3);
    }

    #[test]
    fn polygons_outside_the_frame_are_clipped() {
        let mut backend = DetectorBackend::new(
            CannedModel(vec![detection(0, 0.9, square(-10, -10, 100, 100))]),
            &config(vec![0], MaskEncoding::Binary),
        );
        let mask = backend.segment(&RgbImage::new(5, 4)).unwrap();
        assert_eq!(mask.dimensions(), (5, 4));
        assert_eq!(mask.foreground_count(), 20);
    }

    #[test]
    fn closed_and_degenerate_outlines_are_handled() {
        let mut closed = square(1, 1, 3, 3);
        closed.push(Point::new(1, 1));
        let degenerate = vec![Point::new(0, 0), Point::new(0, 0), Point::new(5, 5)];

        let polygons = [
            Polygon::new(degenerate, None),
            Polygon::new(closed, None),
        ];
        let mask = rasterize(6, 6, &polygons, MaskEncoding::Binary);
        assert_eq!(mask.value(2, 2), 255);
        assert_eq!(mask.value(5, 5), 0);
    }

    #[test]
    fn inference_errors_propagate() {
        let mut backend =
            DetectorBackend::new(FailingModel, &config(vec![0], MaskEncoding::Binary));
        let err = backend.segment(&RgbImage::new(2, 2)).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
    }
}
