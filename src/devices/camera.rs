//! Synthetic camera producing JPEG frames

use crate::core::driver::FrameSource;
use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

/// Moving gradient test pattern, JPEG encoded
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    quality: u8,
    frame: u32,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality,
            frame: 0,
        }
    }

    /// Frames captured so far
    pub fn frames(&self) -> u32 {
        self.frame
    }

    fn render(&self) -> RgbImage {
        let (w, h) = (self.width.max(1), self.height.max(1));
        let shift = self.frame % w;
        let blue = (self.frame % 256) as u8;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let r = ((x + shift) % w * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            Rgb([r, g, blue])
        })
    }
}

impl FrameSource for SyntheticCamera {
    fn capture(&mut self) -> Result<Vec<u8>> {
        let image = self.render();
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&image)?;
        self.frame = self.frame.wrapping_add(1);
        Ok(jpeg)
    }
}
