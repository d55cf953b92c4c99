//! Pairwise screenshot diffing.

use image::RgbImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::components::{label, Mask};
use super::config::DiffConfig;
use super::error::{PipelineError, Result};
use super::geometry::Rect;
use super::video::frame::{resize_rgb, to_gray};

/// A changed area after noise removal and merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRegion {
    pub bbox: Rect,
    pub pixel_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityBand {
    Identical,
    NearIdentical,
    PartialChange,
    MajorChange,
}

impl SimilarityBand {
    /// No surviving region always means identical, whatever the noise.
    pub fn classify(similarity_percent: f64, has_regions: bool) -> Self {
        if !has_regions {
            SimilarityBand::Identical
        } else if similarity_percent >= 95.0 {
            SimilarityBand::NearIdentical
        } else if similarity_percent >= 80.0 {
            SimilarityBand::PartialChange
        } else {
            SimilarityBand::MajorChange
        }
    }

    /// One-line verdict for summaries.
    pub fn status(&self) -> &'static str {
        match self {
            SimilarityBand::Identical => "identical",
            SimilarityBand::NearIdentical => "near identical (minor differences)",
            SimilarityBand::PartialChange => "partial changes",
            SimilarityBand::MajorChange => "major changes",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiffOutcome {
    /// 100 × (1 − changed / total), two decimals.
    pub similarity_percent: f64,
    /// Sorted by (y, x); pairwise disjoint.
    pub regions: Vec<DiffRegion>,
    /// The candidate was resized to the baseline's dimensions.
    pub resized: bool,
    /// The resized candidate, kept so renderers don't resize it again.
    pub aligned: Option<RgbImage>,
    /// Changed pixels that survived noise removal.
    pub mask: Mask,
    pub band: SimilarityBand,
}

impl DiffOutcome {
    /// The candidate as it was compared: `original` unless it had to be resized.
    pub fn candidate<'a>(&'a self, original: &'a RgbImage) -> &'a RgbImage {
        self.aligned.as_ref().unwrap_or(original)
    }
}

fn check_area(image: &RgbImage, what: &str) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::InvalidImage(format!(
            "{} image has zero area ({}x{})",
            what,
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

/// Merges regions until every pair is more than `gap` pixels apart.
fn merge_regions(mut regions: Vec<DiffRegion>, gap: u32) -> Vec<DiffRegion> {
    'restart: loop {
        for i in 0..regions.len() {
            for j in (i + 1)..regions.len() {
                if regions[i].bbox.gap(&regions[j].bbox) <= gap {
                    let other = regions.swap_remove(j);
                    regions[i].bbox = regions[i].bbox.union(&other.bbox);
                    regions[i].pixel_count += other.pixel_count;
                    continue 'restart;
                }
            }
        }
        break;
    }
    regions.sort_by_key(|r| (r.bbox.y, r.bbox.x));
    regions
}

/// Thresholds the luma difference and groups changed pixels into regions.
pub struct RegionDiffer {
    config: DiffConfig,
}

impl RegionDiffer {
    pub fn new(config: &DiffConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Compares `candidate` against `baseline`, resizing the candidate when
    /// the dimensions differ.
    pub fn diff(&self, baseline: &RgbImage, candidate: &RgbImage) -> Result<DiffOutcome> {
        check_area(baseline, "baseline")?;
        check_area(candidate, "candidate")?;

        let resized = baseline.dimensions() != candidate.dimensions();
        if resized {
            info!(
                "📐 resizing candidate {}x{} -> {}x{}",
                candidate.width(),
                candidate.height(),
                baseline.width(),
                baseline.height()
            );
        }
        let aligned = resized.then(|| resize_rgb(candidate, baseline.width(), baseline.height()));

        let a = to_gray(baseline);
        let b = to_gray(aligned.as_ref().unwrap_or(candidate));
        let (w, h) = a.dimensions();
        let threshold = self.config.pixel_threshold;
        let mut mask = Mask::from_fn(w, h, |x, y| {
            a.get_pixel(x, y).0[0].abs_diff(b.get_pixel(x, y).0[0]) > threshold
        });

        let mut regions = Vec::new();
        let mut noise = 0usize;
        for component in label(&mask) {
            if component.pixel_count() < self.config.min_region_pixels {
                noise += component.pixel_count();
                for &(x, y) in &component.pixels {
                    mask.set(x, y, false);
                }
                continue;
            }
            regions.push(DiffRegion {
                bbox: component.bbox,
                pixel_count: component.pixel_count(),
            });
        }
        let regions = merge_regions(regions, self.config.merge_gap);

        let total = mask.len() as f64;
        let changed = mask.count() as f64;
        let similarity_percent = (100.0 * (1.0 - changed / total) * 100.0).round() / 100.0;
        let band = SimilarityBand::classify(similarity_percent, !regions.is_empty());

        debug!(
            "diff: {} regions, {} changed px, {} noise px cleared",
            regions.len(),
            changed,
            noise
        );

        Ok(DiffOutcome {
            similarity_percent,
            regions,
            resized,
            aligned,
            mask,
            band,
        })
    }
}
