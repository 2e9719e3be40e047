use image::{imageops, GrayImage, RgbImage};
use ndarray::Array4;

/// Tensor layout a model expects its image input in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// [1, 3, H, W]
    Nchw,
    /// [1, H, W, 3]
    Nhwc,
}

/// Converts RGB frames into normalized model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    layout: TensorLayout,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32, layout: TensorLayout) -> Self {
        Self {
            target_width,
            target_height,
            layout,
        }
    }

    /// (width, height) of the produced tensor
    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Resize to the target size (no letterboxing), scale to [0, 1] and lay
    /// out channels according to the configured layout
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        let (h, w) = (height as usize, width as usize);
        let mut tensor = match self.layout {
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, h, w)),
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, h, w, 3)),
        };

        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                match self.layout {
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
                }
            }
        }

        tensor
    }

    /// Resize a category map back to frame dimensions.
    ///
    /// Nearest-neighbour sampling keeps class ids intact.
    pub fn postprocess_categories(
        categories: GrayImage,
        target_width: u32,
        target_height: u32,
    ) -> GrayImage {
        let _span = tracing::debug_span!("postprocess").entered();

        if categories.dimensions() == (target_width, target_height) {
            return categories;
        }

        imageops::resize(
            &categories,
            target_width,
            target_height,
            imageops::FilterType::Nearest,
        )
    }
}
