//! Before/after screenshot comparison.

use std::fs;
use std::path::Path;

use image::RgbImage;
use log::info;

use crate::core::config::{PipelineConfig, PriceTable};
use crate::core::cost::CostEstimate;
use crate::core::diff::RegionDiffer;
use crate::core::error::{ImageSide, PipelineError, Result};
use crate::core::render::OutputRenderer;
use crate::core::report::DiffReport;
use crate::core::video::source::load_image;

/// Artifact names, relative to the output directory.
pub const SIDE_BY_SIDE_FILE: &str = "diff_side_by_side.jpg";
pub const HIGHLIGHT_FILE: &str = "diff_highlight.jpg";
pub const DIFF_ONLY_FILE: &str = "diff_only.jpg";
pub const BLEND_FILE: &str = "diff_blend.jpg";

/// Compares a baseline screenshot with a candidate and writes review images.
pub struct ScreenshotComparer {
    differ: RegionDiffer,
    renderer: OutputRenderer,
    prices: PriceTable,
}

fn load_side(path: &Path, side: ImageSide) -> Result<RgbImage> {
    load_image(path, 0)
        .map(|frame| frame.into_pixels())
        .map_err(|e| PipelineError::Comparison {
            side,
            source: Box::new(e),
        })
}

impl ScreenshotComparer {
    /// Validates `config` and sets up the differ and renderer.
    pub fn create(config: &PipelineConfig) -> Result<Self> {
        crate::init_logging();
        config.validate()?;
        info!(
            "🆚 ScreenshotComparer: pixel threshold {}, min region {} px",
            config.diff.pixel_threshold, config.diff.min_region_pixels
        );
        Ok(Self {
            differ: RegionDiffer::new(&config.diff),
            renderer: OutputRenderer::new(&config.diff.output),
            prices: config.price.clone(),
        })
    }

    /// Diffs `candidate` against `baseline` and writes the four review images.
    pub fn compare(&self, baseline: &Path, candidate: &Path, out_dir: &Path) -> Result<DiffReport> {
        let before = load_side(baseline, ImageSide::Baseline)?;
        let after = load_side(candidate, ImageSide::Candidate)?;
        fs::create_dir_all(out_dir)?;
        info!(
            "🚀 comparing {} ({}x{}) with {} ({}x{})",
            baseline.display(),
            before.width(),
            before.height(),
            candidate.display(),
            after.width(),
            after.height()
        );

        let outcome = self.differ.diff(&before, &after)?;
        let aligned = outcome.candidate(&after);

        let renders = [
            (SIDE_BY_SIDE_FILE, self.renderer.side_by_side(&before, aligned)),
            (HIGHLIGHT_FILE, self.renderer.highlight(aligned, &outcome.regions)),
            (DIFF_ONLY_FILE, self.renderer.diff_only(aligned, &outcome.mask)),
            (BLEND_FILE, self.renderer.blend(&before, aligned)),
        ];

        let mut artifacts = Vec::with_capacity(renders.len());
        let mut dims = Vec::with_capacity(renders.len());
        for (name, image) in &renders {
            let encoded = self.renderer.write(image, &out_dir.join(name))?;
            dims.push((encoded.width, encoded.height));
            artifacts.push(encoded.path);
        }

        let cost = CostEstimate::estimate(dims, &self.prices);
        info!(
            "✅ similarity {:.2}%: {} ({} regions)",
            outcome.similarity_percent,
            outcome.band.status(),
            outcome.regions.len()
        );

        Ok(DiffReport {
            baseline: baseline.to_path_buf(),
            candidate: candidate.to_path_buf(),
            output_dir: out_dir.to_path_buf(),
            similarity_percent: outcome.similarity_percent,
            band: outcome.band,
            status: outcome.band.status().to_string(),
            resized: outcome.resized,
            regions: outcome.regions,
            artifacts,
            cost,
        })
    }
}

impl Drop for ScreenshotComparer {
    fn drop(&mut self) {
        info!("🗑️ ScreenshotComparer: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff::SimilarityBand;
    use crate::core::geometry::Rect;
    use crate::core::video::frame::test_support::{fill_rect, solid};

    fn comparer() -> ScreenshotComparer {
        ScreenshotComparer::create(&PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_identical_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        solid(120, 90, [128, 128, 128]).save(&a).unwrap();
        solid(120, 90, [128, 128, 128]).save(&b).unwrap();

        let report = comparer().compare(&a, &b, &dir.path().join("out")).unwrap();
        assert_eq!(report.similarity_percent, 100.0);
        assert!(report.regions.is_empty());
        assert_eq!(report.band, SimilarityBand::Identical);
        assert_eq!(report.artifacts.len(), 4);
        for artifact in &report.artifacts {
            assert!(artifact.exists());
        }
        assert_eq!(report.cost.image_count, 4);
    }

    #[test]
    fn test_changed_button() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("before.png");
        let b = dir.path().join("after.png");
        let base = solid(200, 200, [250, 250, 250]);
        let mut changed = base.clone();
        fill_rect(&mut changed, 50, 150, 100, 30, [30, 90, 200]);
        base.save(&a).unwrap();
        changed.save(&b).unwrap();

        let report = comparer().compare(&a, &b, dir.path()).unwrap();
        assert_eq!(report.regions.len(), 1);
        assert_eq!(report.regions[0].bbox, Rect::new(50, 150, 100, 30));
        assert_eq!(report.similarity_percent, 92.5);
        assert_eq!(report.band, SimilarityBand::PartialChange);
        assert!(!report.resized);

        let side = image::open(dir.path().join(SIDE_BY_SIDE_FILE)).unwrap();
        assert_eq!((side.width(), side.height()), (400, 200));
    }

    #[test]
    fn test_missing_candidate_names_side() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        solid(10, 10, [0, 0, 0]).save(&a).unwrap();

        let err = comparer()
            .compare(&a, &dir.path().join("gone.png"), dir.path())
            .unwrap_err();
        match err {
            PipelineError::Comparison { side, .. } => assert_eq!(side, ImageSide::Candidate),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_size_mismatch_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        solid(100, 200, [0, 0, 0]).save(&a).unwrap();
        solid(50, 100, [0, 0, 0]).save(&b).unwrap();

        let report = comparer().compare(&a, &b, dir.path()).unwrap();
        assert!(report.resized);
        assert_eq!(report.similarity_percent, 100.0);
    }
}
