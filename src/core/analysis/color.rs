//! HSV conversion and color-band masks.
//!
//! Hue is kept in the 0..180 range so band limits can be written the way
//! they are usually quoted for 8-bit HSV (red is `[0, 10]` and `[160, 180]`).

use image::RgbImage;

use crate::core::components::Mask;
use crate::core::config::ColorBandConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

/// OpenCV-style conversion: hue is degrees / 2.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * (gf - bf) / delta
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    Hsv {
        h: (h / 2.0).round().min(180.0) as u8,
        s: s.round() as u8,
        v: max as u8,
    }
}

impl ColorBandConfig {
    pub fn contains(&self, hsv: Hsv) -> bool {
        hsv.s >= self.min_saturation
            && hsv.v >= self.min_value
            && self
                .hue_ranges
                .iter()
                .any(|[lo, hi]| hsv.h >= *lo && hsv.h <= *hi)
    }
}

/// Pixels of `image` that fall inside `band`.
pub fn band_mask(image: &RgbImage, band: &ColorBandConfig) -> Mask {
    Mask::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        band.contains(rgb_to_hsv(r, g, b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::frame::test_support::{fill_rect, solid};

    #[test]
    fn test_primary_hues() {
        assert_eq!(rgb_to_hsv(255, 0, 0), Hsv { h: 0, s: 255, v: 255 });
        assert_eq!(rgb_to_hsv(0, 255, 0).h, 60);
        assert_eq!(rgb_to_hsv(0, 0, 255).h, 120);
        assert_eq!(rgb_to_hsv(255, 255, 255), Hsv { h: 0, s: 0, v: 255 });
        assert_eq!(rgb_to_hsv(0, 0, 0), Hsv { h: 0, s: 0, v: 0 });
    }

    #[test]
    fn test_bands() {
        let red = ColorBandConfig::red();
        let warning = ColorBandConfig::warning();

        assert!(red.contains(rgb_to_hsv(255, 0, 0)));
        // Crimson wraps around to the top of the hue range.
        assert!(red.contains(rgb_to_hsv(220, 20, 60)));
        assert!(!red.contains(rgb_to_hsv(255, 200, 200)));

        assert!(warning.contains(rgb_to_hsv(255, 200, 0)));
        assert!(warning.contains(rgb_to_hsv(255, 165, 0)));
        assert!(!warning.contains(rgb_to_hsv(255, 0, 0)));
    }

    #[test]
    fn test_band_mask() {
        let mut image = solid(20, 20, [255, 255, 255]);
        fill_rect(&mut image, 5, 5, 4, 3, [230, 10, 10]);
        let mask = band_mask(&image, &ColorBandConfig::red());
        assert_eq!(mask.count(), 12);
        assert!(mask.get(5, 5));
        assert!(!mask.get(9, 5));
    }
}
