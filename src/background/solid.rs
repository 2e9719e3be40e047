use super::BackgroundEffect;
use image::{Rgb, RgbImage};

/// Fills the whole background with one color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidColor {
    color: Rgb<u8>,
}

impl SolidColor {
    pub fn new(color: Rgb<u8>) -> Self {
        Self { color }
    }

    pub fn color(&self) -> Rgb<u8> {
        self.color
    }
}

impl Default for SolidColor {
    fn default() -> Self {
        Self::new(Rgb([0, 0, 0]))
    }
}

impl BackgroundEffect for SolidColor {
    fn make_background(&self, frame: &RgbImage) -> RgbImage {
        let (width, height) = frame.dimensions();
        RgbImage::from_pixel(width, height, self.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pixel_is_the_configured_color() {
        let frame = RgbImage::from_fn(5, 3, |x, y| Rgb([x as u8, y as u8, 200]));
        let background = SolidColor::new(Rgb([12, 34, 56])).make_background(&frame);

        assert_eq!(background.dimensions(), (5, 3));
        assert!(background.pixels().all(|p| *p == Rgb([12, 34, 56])));
    }
}
