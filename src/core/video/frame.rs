use std::time::Duration;

use image::{imageops, DynamicImage, GrayImage, RgbImage};

use crate::core::error::{PipelineError, Result};

/// A decoded frame. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Frame {
    index: u64,
    timestamp: Duration,
    pixels: RgbImage,
}

impl Frame {
    /// Rejects zero-area buffers.
    pub fn new(index: u64, timestamp: Duration, pixels: RgbImage) -> Result<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(PipelineError::InvalidImage(format!(
                "frame {} has zero area ({}x{})",
                index,
                pixels.width(),
                pixels.height()
            )));
        }
        Ok(Self {
            index,
            timestamp,
            pixels,
        })
    }

    /// Builds a frame from tightly packed RGB24 bytes.
    pub fn from_rgb(
        index: u64,
        timestamp: Duration,
        width: u32,
        height: u32,
        data: Vec<u8>,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(PipelineError::InvalidImage(format!(
                "frame {}: expected {} bytes for {}x{} RGB, got {}",
                index,
                expected,
                width,
                height,
                data.len()
            )));
        }
        let pixels = RgbImage::from_raw(width, height, data).ok_or_else(|| {
            PipelineError::InvalidImage(format!("frame {}: buffer rejected", index))
        })?;
        Self::new(index, timestamp, pixels)
    }

    /// Converts any decoded image to RGB8.
    pub fn from_dynamic(index: u64, timestamp: Duration, image: DynamicImage) -> Result<Self> {
        Self::new(index, timestamp, image.to_rgb8())
    }

    /// Position in the source: decode order for video, list order for images.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Presentation time; zero for still images.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Full-resolution RGB buffer.
    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Drops the metadata and keeps the buffer.
    pub fn into_pixels(self) -> RgbImage {
        self.pixels
    }
}

/// BT.601 luma with integer weights.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

/// Luma plane using [`luma`].
pub fn to_gray(image: &RgbImage) -> GrayImage {
    let (w, h) = image.dimensions();
    let data = image
        .as_raw()
        .chunks_exact(3)
        .map(|rgb| luma(rgb[0], rgb[1], rgb[2]))
        .collect();
    // Same dimensions, one byte per pixel: the buffer always fits.
    GrayImage::from_raw(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
}

/// Bilinear resize; returns a clone when already at the target size.
pub fn resize_rgb(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, imageops::FilterType::Triangle)
}

pub fn resize_gray(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, imageops::FilterType::Triangle)
}

/// `m:ss.ss`, the format reviewers read timestamps in.
pub fn format_timestamp(timestamp: Duration) -> String {
    let secs = timestamp.as_secs_f64();
    let minutes = (secs / 60.0).floor() as u64;
    let rest = secs - minutes as f64 * 60.0;
    format!("{}:{:05.2}", minutes, rest)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use image::Rgb;

    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(color))
    }

    pub fn fill_rect(image: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..(y + h).min(image.height()) {
            for px in x..(x + w).min(image.width()) {
                image.put_pixel(px, py, Rgb(color));
            }
        }
    }

    pub fn frame(index: u64, image: RgbImage) -> Frame {
        Frame::new(index, Duration::from_millis(index * 33), image).unwrap()
    }
}
