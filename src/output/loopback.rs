use super::OutputSink;
use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// Virtual camera backed by a v4l2loopback device, fed YUYV frames
pub struct LoopbackSink {
    _device: Device,
    file: File,
    width: u32,
    height: u32,
}

impl LoopbackSink {
    pub fn open<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device {} at {}x{}",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2loopback device {}", path.display()))?;

        let requested = Format::new(width, height, FourCC::new(b"YUYV"));
        let format = Output::set_format(&device, &requested)
            .context("Failed to set v4l2loopback output format")?;
        if (format.width, format.height) != (width, height) {
            tracing::warn!(
                "Loopback device accepted {}x{} instead of {}x{}",
                format.width,
                format.height,
                width,
                height
            );
        }

        // v4l2loopback takes raw frames written to the device node
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?;

        Ok(Self {
            _device: device,
            file,
            width: format.width,
            height: format.height,
        })
    }
}

impl OutputSink for LoopbackSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let yuyv = if frame.dimensions() != (self.width, self.height) {
            let resized = imageops::resize(
                frame,
                self.width,
                self.height,
                imageops::FilterType::Triangle,
            );
            encode_yuyv(&resized)
        } else {
            encode_yuyv(frame)
        };

        self.file
            .write_all(&yuyv)
            .context("Failed to write frame to v4l2loopback device")
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Pack RGB into YUYV (4:2:2): each horizontal pixel pair shares averaged
/// chroma. An odd trailing pixel is paired with itself.
fn encode_yuyv(frame: &RgbImage) -> Vec<u8> {
    let (width, height) = frame.dimensions();
    let mut out = Vec::with_capacity((width.div_ceil(2) * 4 * height) as usize);

    for row in frame.rows() {
        let row: Vec<_> = row.collect();
        for pair in row.chunks(2) {
            let left = pair[0];
            let right = pair.get(1).copied().unwrap_or(left);

            let (y0, u0, v0) = bt601(left.0);
            let (y1, u1, v1) = bt601(right.0);

            out.extend_from_slice(&[
                y0,
                ((u0 as u16 + u1 as u16) / 2) as u8,
                y1,
                ((v0 as u16 + v1 as u16) / 2) as u8,
            ]);
        }
    }

    out
}

fn bt601([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.147 * r - 0.289 * g + 0.436 * b + 128.0;
    let v = 0.615 * r - 0.515 * g - 0.100 * b + 128.0;
    (
        y.round().clamp(0.0, 255.0) as u8,
        u.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn yuyv_is_two_bytes_per_pixel() {
        let frame = RgbImage::new(4, 3);
        assert_eq!(encode_yuyv(&frame).len(), 4 * 3 * 2);
    }

    #[test]
    fn odd_width_pads_last_pair() {
        let frame = RgbImage::new(3, 1);
        assert_eq!(encode_yuyv(&frame).len(), 8);
    }

    #[test]
    fn gray_has_neutral_chroma() {
        let frame = RgbImage::from_pixel(2, 1, Rgb([128, 128, 128]));
        assert_eq!(encode_yuyv(&frame), vec![128, 128, 128, 128]);
    }

    #[test]
    fn white_and_black_luma() {
        let mut frame = RgbImage::new(2, 1);
        frame.put_pixel(0, 0, Rgb([255, 255, 255]));
        let yuyv = encode_yuyv(&frame);
        assert_eq!(yuyv[0], 255);
        assert_eq!(yuyv[2], 0);
    }
}
