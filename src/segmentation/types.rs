use crate::error::Result;
use image::{GrayImage, Luma, RgbImage};
use imageproc::point::Point;

/// Value written for foreground pixels in a binary mask
pub const FOREGROUND: u8 = 255;

/// How a backend encodes foreground cells in its mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskEncoding {
    /// 0 = background, 255 = foreground
    #[default]
    Binary,
    /// 0 = background, 1..N = foreground class id + 1
    Categorical,
}

impl std::str::FromStr for MaskEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "categorical" => Ok(Self::Categorical),
            other => Err(format!(
                "unknown mask encoding '{other}' (expected 'binary' or 'categorical')"
            )),
        }
    }
}

/// Per-pixel foreground indicator with the same dimensions as its frame.
///
/// Whatever the encoding, a cell is foreground iff it is nonzero.
/// A mask is produced fresh for every frame and never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    values: GrayImage,
    encoding: MaskEncoding,
}

impl Mask {
    /// All-background mask of the given size
    pub fn empty(width: u32, height: u32, encoding: MaskEncoding) -> Self {
        Self {
            values: GrayImage::new(width, height),
            encoding,
        }
    }

    /// Wrap a binary mask. Any nonzero cell counts as foreground.
    pub fn binary(values: GrayImage) -> Self {
        Self {
            values,
            encoding: MaskEncoding::Binary,
        }
    }

    /// Wrap a category id map where 0 is background
    pub fn categorical(values: GrayImage) -> Self {
        Self {
            values,
            encoding: MaskEncoding::Categorical,
        }
    }

    pub fn encoding(&self) -> MaskEncoding {
        self.encoding
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.values.dimensions()
    }

    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.values.get_pixel(x, y)[0]
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.value(x, y) != 0
    }

    pub fn foreground_count(&self) -> usize {
        self.values.pixels().filter(|p| p[0] != 0).count()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.values
    }

    pub fn into_image(self) -> GrayImage {
        self.values
    }

    /// Grayscale rendering for visual inspection: foreground white, background black
    pub fn to_rgb(&self) -> RgbImage {
        let (width, height) = self.dimensions();
        RgbImage::from_fn(width, height, |x, y| {
            let value = if self.is_foreground(x, y) { FOREGROUND } else { 0 };
            image::Rgb([value, value, value])
        })
    }

    pub(crate) fn values_mut(&mut self) -> &mut GrayImage {
        &mut self.values
    }

    /// Cell value used when filling a detection of `class_id`
    pub(crate) fn fill_value(&self, class_id: u32) -> Luma<u8> {
        match self.encoding {
            MaskEncoding::Binary => Luma([FOREGROUND]),
            MaskEncoding::Categorical => Luma([class_id.saturating_add(1).min(u8::MAX as u32) as u8]),
        }
    }
}

/// Closed outline in frame pixel coordinates, optionally tagged with a class id
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<Point<i32>>,
    pub class_id: Option<u32>,
}

impl Polygon {
    pub fn new(points: Vec<Point<i32>>, class_id: Option<u32>) -> Self {
        Self { points, class_id }
    }
}

/// One accepted instance from a detector model
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub polygon: Polygon,
}

/// Trait for segmentation backends
///
/// Allows swapping between different strategies (instance detector,
/// dense per-pixel classifier, ...).
pub trait SegmentationBackend {
    /// Compute the foreground mask of a frame
    ///
    /// The returned mask always has the frame's dimensions.
    fn segment(&mut self, frame: &RgbImage) -> Result<Mask>;

    /// Registered name of the strategy, used in logs
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_nonzero_value_is_foreground() {
        let mut values = GrayImage::new(3, 1);
        values.put_pixel(1, 0, Luma([1]));
        values.put_pixel(2, 0, Luma([255]));

        let mask = Mask::categorical(values);
        assert!(!mask.is_foreground(0, 0));
        assert!(mask.is_foreground(1, 0));
        assert!(mask.is_foreground(2, 0));
        assert_eq!(mask.foreground_count(), 2);
    }

    #[test]
    fn fill_value_depends_on_encoding() {
        let binary = Mask::empty(1, 1, MaskEncoding::Binary);
        assert_eq!(binary.fill_value(3), Luma([255]));

        let categorical = Mask::empty(1, 1, MaskEncoding::Categorical);
        assert_eq!(categorical.fill_value(0), Luma([1]));
        assert_eq!(categorical.fill_value(3), Luma([4]));
        assert_eq!(categorical.fill_value(1000), Luma([255]));
    }

    #[test]
    fn preview_is_white_on_black() {
        let mut values = GrayImage::new(2, 1);
        values.put_pixel(0, 0, Luma([2]));
        let preview = Mask::categorical(values).to_rgb();
        assert_eq!(preview.get_pixel(0, 0), &image::Rgb([255, 255, 255]));
        assert_eq!(preview.get_pixel(1, 0), &image::Rgb([0, 0, 0]));
    }

    #[test]
    fn parses_encoding_names() {
        assert_eq!("binary".parse::<MaskEncoding>(), Ok(MaskEncoding::Binary));
        assert_eq!(
            "categorical".parse::<MaskEncoding>(),
            Ok(MaskEncoding::Categorical)
        );
        assert!("alpha".parse::<MaskEncoding>().is_err());
    }
}
