//! Review artifacts.
//!
//! Everything here works on full-resolution buffers produced by the analysis
//! stages. `scale` and `quality` are applied only in [`OutputRenderer::encode`],
//! so rendering choices never feed back into scores or classifications.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{imageops, ImageOutputFormat, Rgb, RgbImage};
use log::debug;

use super::analysis::AnomalyEvent;
use super::components::Mask;
use super::config::OutputConfig;
use super::diff::DiffRegion;
use super::error::{PipelineError, Result};
use super::geometry::Rect;

const FILL_ALPHA: f32 = 0.3;
const OUTLINE_PX: u32 = 2;
/// Largest side of an encoded artifact. JPEG itself stops at 65535.
pub const MAX_OUTPUT_EDGE: u32 = 16_384;

/// A JPEG written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
}

fn mix(base: u8, over: u8, alpha: f32) -> u8 {
    (base as f32 * (1.0 - alpha) + over as f32 * alpha).round() as u8
}

/// Draws a `thickness`-pixel outline just inside `rect`.
pub fn outline(image: &mut RgbImage, rect: &Rect, color: [u8; 3], thickness: u32) {
    let right = rect.right().min(image.width());
    let bottom = rect.bottom().min(image.height());
    for y in rect.y..bottom {
        for x in rect.x..right {
            let edge = x - rect.x < thickness
                || right - 1 - x < thickness
                || y - rect.y < thickness
                || bottom - 1 - y < thickness;
            if edge {
                image.put_pixel(x, y, Rgb(color));
            }
        }
    }
}

fn fill(image: &mut RgbImage, rect: &Rect, color: [u8; 3], alpha: f32) {
    let right = rect.right().min(image.width());
    let bottom = rect.bottom().min(image.height());
    for y in rect.y..bottom {
        for x in rect.x..right {
            let p = image.get_pixel_mut(x, y);
            for c in 0..3 {
                p.0[c] = mix(p.0[c], color[c], alpha);
            }
        }
    }
}

/// Draws review images and encodes them per [`OutputConfig`].
pub struct OutputRenderer {
    config: OutputConfig,
}

impl OutputRenderer {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Candidate with every region tinted and outlined in the highlight color.
    pub fn highlight(&self, candidate: &RgbImage, regions: &[DiffRegion]) -> RgbImage {
        let mut out = candidate.clone();
        let color = self.config.highlight_color;
        for region in regions {
            fill(&mut out, &region.bbox, color, FILL_ALPHA);
            outline(&mut out, &region.bbox, color, OUTLINE_PX);
        }
        out
    }

    /// Baseline on the left, candidate on the right, black padding below the
    /// shorter one.
    pub fn side_by_side(&self, baseline: &RgbImage, candidate: &RgbImage) -> RgbImage {
        let width = baseline.width() + candidate.width();
        let height = baseline.height().max(candidate.height());
        let mut out = RgbImage::new(width, height);
        imageops::replace(&mut out, baseline, 0, 0);
        imageops::replace(&mut out, candidate, baseline.width() as i64, 0);
        out
    }

    /// Candidate pixels under the mask, black elsewhere.
    pub fn diff_only(&self, candidate: &RgbImage, mask: &Mask) -> RgbImage {
        RgbImage::from_fn(candidate.width(), candidate.height(), |x, y| {
            if x < mask.width() && y < mask.height() && mask.get(x, y) {
                *candidate.get_pixel(x, y)
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    /// 50/50 average; `candidate` must already match the baseline's size.
    pub fn blend(&self, baseline: &RgbImage, candidate: &RgbImage) -> RgbImage {
        RgbImage::from_fn(baseline.width(), baseline.height(), |x, y| {
            let a = baseline.get_pixel(x, y).0;
            let b = if x < candidate.width() && y < candidate.height() {
                candidate.get_pixel(x, y).0
            } else {
                a
            };
            Rgb([
                ((a[0] as u16 + b[0] as u16) / 2) as u8,
                ((a[1] as u16 + b[1] as u16) / 2) as u8,
                ((a[2] as u16 + b[2] as u16) / 2) as u8,
            ])
        })
    }

    /// The frame behind an anomaly, outlined or cropped to the event bbox.
    pub fn anomaly(&self, frame: &RgbImage, event: &AnomalyEvent) -> RgbImage {
        let Some(bbox) = event.bbox else {
            return frame.clone();
        };
        if self.config.crop_anomalies {
            let r = bbox.padded(self.config.crop_padding, frame.width(), frame.height());
            if r.width > 0 && r.height > 0 {
                return imageops::crop_imm(frame, r.x, r.y, r.width, r.height).to_image();
            }
        }
        let mut out = frame.clone();
        outline(&mut out, &bbox, self.config.highlight_color, OUTLINE_PX);
        out
    }

    /// Output dimensions after scaling; never below 1 px per side.
    ///
    /// Fails with `InvalidImage` when a side would exceed [`MAX_OUTPUT_EDGE`].
    pub fn scaled_dimensions(&self, width: u32, height: u32) -> Result<(u32, u32)> {
        let scale = self.config.scale;
        let side = |len: u32| -> Result<u32> {
            let scaled = (len as f64 * scale).round();
            if scaled > MAX_OUTPUT_EDGE as f64 {
                return Err(PipelineError::InvalidImage(format!(
                    "{}x{} at scale {} exceeds the {} px output limit",
                    width, height, scale, MAX_OUTPUT_EDGE
                )));
            }
            Ok((scaled as u32).max(1))
        };
        Ok((side(width)?, side(height)?))
    }

    /// Resizes by `scale` and encodes as JPEG at `quality`.
    pub fn encode(&self, image: &RgbImage) -> Result<(Vec<u8>, u32, u32)> {
        let (w, h) = self.scaled_dimensions(image.width(), image.height())?;
        let format = ImageOutputFormat::Jpeg(self.config.quality);
        let mut buffer = Cursor::new(Vec::new());
        let written = if (w, h) == image.dimensions() {
            image.write_to(&mut buffer, format)
        } else {
            imageops::resize(image, w, h, imageops::FilterType::Triangle).write_to(&mut buffer, format)
        };
        written.map_err(|e| PipelineError::InvalidImage(format!("jpeg encoding failed: {}", e)))?;
        Ok((buffer.into_inner(), w, h))
    }

    /// Encodes `image` and writes it to `path`.
    pub fn write(&self, image: &RgbImage, path: &Path) -> Result<EncodedImage> {
        let (bytes, width, height) = self.encode(image)?;
        fs::write(path, &bytes)?;
        debug!("wrote {} ({}x{}, {} bytes)", path.display(), width, height, bytes.len());
        Ok(EncodedImage {
            path: path.to_path_buf(),
            width,
            height,
            bytes: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::frame::test_support::{fill_rect, solid};

    fn renderer() -> OutputRenderer {
        OutputRenderer::new(&OutputConfig::default())
    }

    #[test]
    fn test_highlight_without_regions_is_unchanged() {
        let image = solid(40, 30, [12, 200, 99]);
        assert_eq!(renderer().highlight(&image, &[]), image);
    }

    #[test]
    fn test_highlight_tints_and_outlines() {
        let image = solid(50, 50, [255, 255, 255]);
        let region = DiffRegion {
            bbox: Rect::new(10, 10, 20, 20),
            pixel_count: 400,
        };
        let out = renderer().highlight(&image, &[region]);
        assert_eq!(out.get_pixel(10, 10).0, [255, 0, 255]);
        assert_eq!(out.get_pixel(29, 29).0, [255, 0, 255]);
        // Interior: white blended 30% toward magenta.
        let inner = out.get_pixel(20, 20).0;
        assert_eq!((inner[0], inner[2]), (255, 255));
        assert!((178..=179).contains(&inner[1]));
        assert_eq!(out.get_pixel(5, 5).0, [255, 255, 255]);
    }

    #[test]
    fn test_side_by_side_layout() {
        let a = solid(10, 8, [255, 0, 0]);
        let b = solid(6, 12, [0, 0, 255]);
        let out = renderer().side_by_side(&a, &b);
        assert_eq!(out.dimensions(), (16, 12));
        assert_eq!(out.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(out.get_pixel(10, 11).0, [0, 0, 255]);
        assert_eq!(out.get_pixel(0, 11).0, [0, 0, 0]);
    }

    #[test]
    fn test_diff_only_and_blend() {
        let a = solid(4, 4, [200, 100, 0]);
        let mut b = solid(4, 4, [0, 100, 200]);
        fill_rect(&mut b, 0, 0, 1, 1, [9, 9, 9]);
        let mut mask = Mask::new(4, 4);
        mask.set(0, 0, true);

        let only = renderer().diff_only(&b, &mask);
        assert_eq!(only.get_pixel(0, 0).0, [9, 9, 9]);
        assert_eq!(only.get_pixel(3, 3).0, [0, 0, 0]);

        let blended = renderer().blend(&a, &b);
        assert_eq!(blended.get_pixel(2, 2).0, [100, 100, 100]);
    }

    #[test]
    fn test_anomaly_outline_and_crop() {
        use crate::core::analysis::AnomalyClassifier;
        use crate::core::config::AnomalyConfig;
        use crate::core::video::frame::test_support::frame;

        let mut image = solid(200, 200, [255, 255, 255]);
        fill_rect(&mut image, 60, 60, 50, 50, [255, 0, 0]);
        let f = frame(3, image);
        let event = AnomalyClassifier::new(&AnomalyConfig::default())
            .classify(&f, Path::new("run.mp4"))
            .unwrap();

        let outlined = renderer().anomaly(f.pixels(), &event);
        assert_eq!(outlined.dimensions(), (200, 200));
        assert_eq!(outlined.get_pixel(60, 60).0, [255, 0, 255]);

        let cropping = OutputRenderer::new(&OutputConfig {
            crop_anomalies: true,
            ..OutputConfig::default()
        });
        assert_eq!(cropping.anomaly(f.pixels(), &event).dimensions(), (82, 82));
    }

    #[test]
    fn test_scaled_dimensions_never_zero() {
        let r = OutputRenderer::new(&OutputConfig {
            scale: 0.001,
            ..OutputConfig::default()
        });
        assert_eq!(r.scaled_dimensions(100, 50).unwrap(), (1, 1));

        let r = OutputRenderer::new(&OutputConfig::for_keyframes());
        assert_eq!(r.scaled_dimensions(1080, 1920).unwrap(), (324, 576));
    }

    #[test]
    fn test_huge_scale_is_an_error() {
        let r = OutputRenderer::new(&OutputConfig {
            scale: 1e9,
            ..OutputConfig::default()
        });
        assert!(r.config.validate().is_ok());
        assert!(matches!(
            r.scaled_dimensions(40, 30),
            Err(PipelineError::InvalidImage(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.jpg");
        let err = r.write(&solid(40, 30, [0, 0, 0]), &path).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));
        assert!(!path.exists());

        let r = OutputRenderer::new(&OutputConfig {
            scale: 4.0,
            ..OutputConfig::default()
        });
        assert_eq!(r.scaled_dimensions(4096, 10).unwrap(), (MAX_OUTPUT_EDGE, 40));
        assert!(r.scaled_dimensions(4097, 10).is_err());
    }

    #[test]
    fn test_write_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let r = OutputRenderer::new(&OutputConfig::for_anomalies());

        let encoded = r.write(&solid(200, 100, [10, 20, 30]), &path).unwrap();
        assert_eq!((encoded.width, encoded.height), (100, 50));
        let decoded = image::open(&path).unwrap();
        assert_eq!(decoded.width(), 100);
        assert_eq!(decoded.height(), 50);
    }

    #[test]
    fn test_lower_quality_is_smaller() {
        let image = RgbImage::from_fn(128, 128, |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, ((x ^ y) * 2) as u8]));
        let low = OutputRenderer::new(&OutputConfig {
            quality: 10,
            ..OutputConfig::default()
        });
        let high = OutputRenderer::new(&OutputConfig {
            quality: 95,
            ..OutputConfig::default()
        });
        assert!(low.encode(&image).unwrap().0.len() < high.encode(&image).unwrap().0.len());
    }
}
