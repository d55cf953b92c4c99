//! Screen-state detectors.
//!
//! Each detector is a plain function over [`FrameFeatures`]. They share no
//! state besides the cached luma plane and edge components, so any one of
//! them can be run and tested on its own.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::f64::consts::PI;

use image::{GrayImage, RgbImage};

use super::classifier::AnomalyKind;
use super::color::band_mask;
use crate::core::components::{label, Component, Mask};
use crate::core::config::{AnomalyConfig, ColorBandConfig};
use crate::core::geometry::Rect;
use crate::core::video::frame::to_gray;

/// What a detector saw when it fired.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub kind: AnomalyKind,
    pub bbox: Option<Rect>,
    pub metrics: BTreeMap<&'static str, f64>,
}

impl Detection {
    fn new(kind: AnomalyKind, bbox: Option<Rect>) -> Self {
        Self {
            kind,
            bbox,
            metrics: BTreeMap::new(),
        }
    }

    fn metric(mut self, name: &'static str, value: f64) -> Self {
        self.metrics.insert(name, value);
        self
    }
}

/// Per-frame inputs shared by the detector chain.
pub struct FrameFeatures<'a> {
    rgb: &'a RgbImage,
    edge_threshold: u16,
    gray: OnceCell<GrayImage>,
    edges: OnceCell<Vec<Component>>,
}

impl<'a> FrameFeatures<'a> {
    pub fn new(rgb: &'a RgbImage, edge_threshold: u16) -> Self {
        Self {
            rgb,
            edge_threshold,
            gray: OnceCell::new(),
            edges: OnceCell::new(),
        }
    }

    pub fn rgb(&self) -> &RgbImage {
        self.rgb
    }

    pub fn gray(&self) -> &GrayImage {
        self.gray.get_or_init(|| to_gray(self.rgb))
    }

    pub fn edge_components(&self) -> &[Component] {
        self.edges
            .get_or_init(|| label(&edge_mask(self.gray(), self.edge_threshold)))
    }

    fn area(&self) -> f64 {
        self.rgb.width() as f64 * self.rgb.height() as f64
    }

    fn near_center(&self, bbox: &Rect, tolerance: f64) -> bool {
        let (w, h) = (self.rgb.width() as f64, self.rgb.height() as f64);
        let (cx, cy) = bbox.center();
        (cx - w / 2.0).abs() <= w * tolerance && (cy - h / 2.0).abs() <= h * tolerance
    }
}

/// A pure check over one frame.
pub type Detector = fn(&FrameFeatures<'_>, &AnomalyConfig) -> Option<Detection>;

/// Evaluation order. The first detector that fires decides the event.
pub const DETECTORS: [Detector; 5] = [red_error, blank_screen, warning_color, dialog, loading];

/// Central-difference gradient magnitude `|gx| + |gy|` above `threshold`.
/// The one-pixel frame border is never an edge.
pub fn edge_mask(gray: &GrayImage, threshold: u16) -> Mask {
    let (w, h) = gray.dimensions();
    Mask::from_fn(w, h, |x, y| {
        if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
            return false;
        }
        let px = |x: u32, y: u32| gray.get_pixel(x, y).0[0] as i32;
        let gx = px(x + 1, y) - px(x - 1, y);
        let gy = px(x, y + 1) - px(x, y - 1);
        (gx.abs() + gy.abs()) as u16 > threshold
    })
}

/// Mean and population standard deviation of a luma plane.
pub fn luma_stats<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = u8>,
{
    let (mut n, mut sum, mut sum_sq) = (0u64, 0f64, 0f64);
    for v in values {
        let v = v as f64;
        n += 1;
        sum += v;
        sum_sq += v * v;
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let var = (sum_sq / n as f64 - mean * mean).max(0.0);
    (mean, var.sqrt())
}

fn color_band(
    features: &FrameFeatures<'_>,
    band: &ColorBandConfig,
    kind: AnomalyKind,
) -> Option<Detection> {
    let mask = band_mask(features.rgb(), band);
    let ratio = mask.ratio();
    if ratio == 0.0 {
        return None;
    }

    let components = label(&mask);
    let largest = components.iter().max_by_key(|c| c.pixel_count())?;
    if ratio <= band.min_ratio && largest.pixel_count() < band.min_region_area {
        return None;
    }

    Some(
        Detection::new(kind, Some(largest.bbox))
            .metric("ratio_pct", ratio * 100.0)
            .metric("largest_region_px", largest.pixel_count() as f64)
            .metric("region_count", components.len() as f64),
    )
}

pub fn red_error(features: &FrameFeatures<'_>, config: &AnomalyConfig) -> Option<Detection> {
    color_band(features, &config.red, AnomalyKind::RedError)
}

pub fn warning_color(features: &FrameFeatures<'_>, config: &AnomalyConfig) -> Option<Detection> {
    color_band(features, &config.warning, AnomalyKind::WarningColor)
}

pub fn blank_screen(features: &FrameFeatures<'_>, config: &AnomalyConfig) -> Option<Detection> {
    let blank = &config.blank;
    let gray = features.gray();
    let total = (gray.width() as u64 * gray.height() as u64) as f64;

    let (mean, std_dev) = luma_stats(gray.pixels().map(|p| p.0[0]));
    if std_dev >= blank.max_std_dev {
        return None;
    }

    let white = gray.pixels().filter(|p| p.0[0] > blank.white_level).count() as f64 / total;
    let black = gray.pixels().filter(|p| p.0[0] < blank.black_level).count() as f64 / total;
    let uniform = white.max(black);
    if uniform <= blank.min_uniform_ratio {
        return None;
    }

    Some(
        Detection::new(AnomalyKind::BlankScreen, None)
            .metric("mean_luma", mean)
            .metric("std_dev", std_dev)
            .metric("uniform_pct", uniform * 100.0),
    )
}

/// Share of `component`'s pixels lying within `band` pixels of its bbox edge.
fn border_ratio(component: &Component, band: u32) -> f64 {
    let b = component.bbox;
    let on_border = component
        .pixels
        .iter()
        .filter(|&&(x, y)| {
            x - b.x < band || b.right() - 1 - x < band || y - b.y < band || b.bottom() - 1 - y < band
        })
        .count();
    on_border as f64 / component.pixel_count().max(1) as f64
}

fn background_std(gray: &GrayImage, inside: &Rect) -> Option<f64> {
    let outside = gray
        .enumerate_pixels()
        .filter(|(x, y, _)| !inside.contains(*x, *y))
        .map(|(_, _, p)| p.0[0]);
    let mut values = outside.peekable();
    values.peek()?;
    Some(luma_stats(values).1)
}

pub fn dialog(features: &FrameFeatures<'_>, config: &AnomalyConfig) -> Option<Detection> {
    let cfg = &config.dialog;
    let frame_area = features.area();

    let mut best: Option<Detection> = None;
    let mut best_area = 0u64;

    for component in features.edge_components() {
        let bbox = component.bbox;
        let area_ratio = bbox.area() as f64 / frame_area;
        if area_ratio < cfg.min_area_ratio || area_ratio > cfg.max_area_ratio {
            continue;
        }
        let aspect = bbox.width as f64 / bbox.height as f64;
        if aspect <= cfg.min_aspect || aspect >= cfg.max_aspect {
            continue;
        }
        if !features.near_center(&bbox, cfg.center_tolerance) || bbox.area() <= best_area {
            continue;
        }

        let band = (bbox.width.min(bbox.height) / 20).max(2);
        let outline = border_ratio(component, band);
        if outline < cfg.min_border_ratio {
            continue;
        }
        let Some(bg_std) = background_std(features.gray(), &bbox) else {
            continue;
        };
        if bg_std > cfg.max_background_std {
            continue;
        }

        best_area = bbox.area();
        best = Some(
            Detection::new(AnomalyKind::Dialog, Some(bbox))
                .metric("area_pct", area_ratio * 100.0)
                .metric("outline_pct", outline * 100.0)
                .metric("background_std", bg_std),
        );
    }

    best
}

pub fn loading(features: &FrameFeatures<'_>, config: &AnomalyConfig) -> Option<Detection> {
    let cfg = &config.loading;

    let mut best: Option<Detection> = None;
    let mut best_pixels = 0usize;

    for component in features.edge_components() {
        let bbox = component.bbox;
        let aspect = bbox.width as f64 / bbox.height as f64;
        if !(0.75..=1.33).contains(&aspect) {
            continue;
        }
        if !features.near_center(&bbox, cfg.center_tolerance) {
            continue;
        }
        if component.pixel_count() <= best_pixels {
            continue;
        }

        let (cx, cy) = bbox.center();
        let polar: Vec<(f64, f64)> = component
            .pixels
            .iter()
            .map(|&(x, y)| {
                let dx = x as f64 + 0.5 - cx;
                let dy = y as f64 + 0.5 - cy;
                (dx.hypot(dy), dy.atan2(dx))
            })
            .collect();

        let n = polar.len() as f64;
        let radius = polar.iter().map(|(d, _)| d).sum::<f64>() / n;
        if radius < cfg.min_radius as f64 || radius > cfg.max_radius as f64 {
            continue;
        }

        let band = radius * cfg.radius_tolerance;
        let on_ring = polar.iter().filter(|(d, _)| (d - radius).abs() <= band).count() as f64 / n;
        if on_ring < cfg.min_ring_ratio {
            continue;
        }

        let mut octants = [false; 8];
        for (_, angle) in &polar {
            let bin = (((angle + PI) / (PI / 4.0)) as usize).min(7);
            octants[bin] = true;
        }
        let covered = octants.iter().filter(|&&hit| hit).count() as u32;
        if covered < cfg.min_octants {
            continue;
        }

        best_pixels = component.pixel_count();
        best = Some(
            Detection::new(AnomalyKind::Loading, Some(bbox))
                .metric("radius", radius)
                .metric("ring_pct", on_ring * 100.0)
                .metric("octants", covered as f64),
        );
    }

    best
}
