//! Structural similarity between two images.
//!
//! Windowed SSIM on luma. Tolerates re-encoding noise that pixel equality
//! would not, which matters for screen recordings.

use image::{GrayImage, RgbImage};

use super::frame::{resize_gray, to_gray};
use crate::core::error::{PipelineError, Result};

const WINDOW: u32 = 8;
/// Wider inputs are downsampled before scoring.
const MAX_SCORING_WIDTH: u32 = 256;
const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

/// Stateless; one scorer can be shared across threads.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityScorer;

impl SimilarityScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score in [0, 1]; 1.0 means identical. Symmetric in its arguments.
    pub fn score(&self, a: &RgbImage, b: &RgbImage) -> Result<f64> {
        let (ga, gb) = self.prepare(a, b)?;
        Ok(windowed_ssim(&ga, &gb))
    }

    /// Brings both images to a shared size: the per-axis minimum, then capped
    /// at `MAX_SCORING_WIDTH`. Both sides go through the same resize path.
    fn prepare(&self, a: &RgbImage, b: &RgbImage) -> Result<(GrayImage, GrayImage)> {
        for (name, image) in [("first", a), ("second", b)] {
            if image.width() == 0 || image.height() == 0 {
                return Err(PipelineError::InvalidImage(format!(
                    "{} image has zero area ({}x{})",
                    name,
                    image.width(),
                    image.height()
                )));
            }
        }

        let mut width = a.width().min(b.width());
        let mut height = a.height().min(b.height());
        if width > MAX_SCORING_WIDTH {
            let ratio = MAX_SCORING_WIDTH as f64 / width as f64;
            width = MAX_SCORING_WIDTH;
            height = ((height as f64 * ratio).round() as u32).max(1);
        }

        let ga = resize_gray(&to_gray(a), width, height);
        let gb = resize_gray(&to_gray(b), width, height);
        Ok((ga, gb))
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean SSIM over non-overlapping windows; edge windows are clipped.
fn windowed_ssim(a: &GrayImage, b: &GrayImage) -> f64 {
    let (w, h) = a.dimensions();
    let mut total = 0.0;
    let mut windows = 0u64;

    let mut wy = 0;
    while wy < h {
        let wh = WINDOW.min(h - wy);
        let mut wx = 0;
        while wx < w {
            let ww = WINDOW.min(w - wx);
            total += window_ssim(a, b, wx, wy, ww, wh);
            windows += 1;
            wx += WINDOW;
        }
        wy += WINDOW;
    }

    if windows == 0 {
        return 1.0;
    }
    (total / windows as f64).clamp(0.0, 1.0)
}

fn window_ssim(a: &GrayImage, b: &GrayImage, x: u32, y: u32, w: u32, h: u32) -> f64 {
    let n = (w * h) as f64;
    let mut sum_a = 0.0;
    let mut sum_b = 0.0;
    for py in y..y + h {
        for px in x..x + w {
            sum_a += a.get_pixel(px, py).0[0] as f64;
            sum_b += b.get_pixel(px, py).0[0] as f64;
        }
    }
    let mean_a = sum_a / n;
    let mean_b = sum_b / n;

    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut cov = 0.0;
    for py in y..y + h {
        for px in x..x + w {
            let da = a.get_pixel(px, py).0[0] as f64 - mean_a;
            let db = b.get_pixel(px, py).0[0] as f64 - mean_b;
            var_a += da * da;
            var_b += db * db;
            cov += da * db;
        }
    }
    var_a /= n;
    var_b /= n;
    cov /= n;

    let numerator = (2.0 * mean_a * mean_b + C1) * (2.0 * cov + C2);
    let denominator = (mean_a * mean_a + mean_b * mean_b + C1) * (var_a + var_b + C2);
    numerator / denominator
}

/// 64-bin luma histogram.
pub fn luma_histogram(image: &RgbImage) -> [u32; 64] {
    let mut hist = [0u32; 64];
    for p in to_gray(image).pixels() {
        hist[(p.0[0] >> 2) as usize] += 1;
    }
    hist
}

/// Histogram intersection ratio in [0, 1]. Cheap but blind to layout, so only
/// useful as a pre-filter.
pub fn histogram_similarity(h1: &[u32; 64], h2: &[u32; 64]) -> f64 {
    let overlap: u64 = h1
        .iter()
        .zip(h2.iter())
        .map(|(a, b)| (*a).min(*b) as u64)
        .sum();
    let sum1: u64 = h1.iter().map(|&v| v as u64).sum();
    let sum2: u64 = h2.iter().map(|&v| v as u64).sum();

    if sum1 == 0 || sum2 == 0 {
        return 0.0;
    }

    overlap as f64 / sum1.max(sum2) as f64
}
