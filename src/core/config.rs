//! Run configuration.
//!
//! Every component receives its config struct explicitly; nothing here is
//! global. Presets mirror the defaults reviewers tuned per run type.
//!
//! `OutputConfig` and `ColorBandConfig` have one preset per use, so they carry
//! no serde field defaults of their own. [`PipelineConfig::from_json5_str`]
//! layers the document over [`PipelineConfig::default`], which keeps the right
//! preset under a partial override such as `anomaly: { warning: { min_ratio: 0.05 } }`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{PipelineError, Result};

/// Output fidelity. Only affects encoded artifacts, never analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub scale: f64,
    pub quality: u8,
    pub highlight_color: [u8; 3],
    pub crop_anomalies: bool,
    pub crop_padding: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            quality: 85,
            highlight_color: [255, 0, 255],
            crop_anomalies: false,
            crop_padding: 16,
        }
    }
}

impl OutputConfig {
    /// Small and lossy: keyframes are sent in bulk.
    pub fn for_keyframes() -> Self {
        Self {
            scale: 0.3,
            quality: 30,
            ..Default::default()
        }
    }

    /// Mid-size: anomaly images are inspected one by one.
    pub fn for_anomalies() -> Self {
        Self {
            scale: 0.5,
            quality: 50,
            ..Default::default()
        }
    }

    /// Full size: diff artifacts are reviewed pixel by pixel.
    pub fn for_diff() -> Self {
        Self::default()
    }

    /// Range checks only; oversized outputs are rejected by the renderer.
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(PipelineError::config(format!(
                "scale must be > 0, got {}",
                self.scale
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(PipelineError::config(format!(
                "quality must be in [1, 100], got {}",
                self.quality
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeConfig {
    /// Frames scoring below this against the last keyframe are kept.
    pub threshold: f64,
    pub min_gap_frames: u64,
    pub max_frames: usize,
    pub output: OutputConfig,
}

impl Default for KeyframeConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            min_gap_frames: 1,
            max_frames: 100,
            output: OutputConfig::for_keyframes(),
        }
    }
}

impl KeyframeConfig {
    /// Defaults with a different keep threshold.
    pub fn with_threshold(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(PipelineError::config(format!(
                "keyframe threshold must be in (0, 1), got {}",
                self.threshold
            )));
        }
        if self.min_gap_frames == 0 {
            return Err(PipelineError::config("min_gap_frames must be >= 1"));
        }
        if self.max_frames == 0 {
            return Err(PipelineError::config("max_frames must be >= 1"));
        }
        self.output.validate()
    }
}

/// An HSV color band in OpenCV units: hue 0..180, saturation/value 0..255.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorBandConfig {
    pub hue_ranges: Vec<[u8; 2]>,
    pub min_saturation: u8,
    pub min_value: u8,
    /// Fires when the in-band share of the frame exceeds this.
    pub min_ratio: f64,
    /// Or when a single connected in-band region reaches this many pixels.
    pub min_region_area: usize,
}

impl ColorBandConfig {
    /// Error red; hue wraps around 180.
    pub fn red() -> Self {
        Self {
            hue_ranges: vec![[0, 10], [160, 180]],
            min_saturation: 100,
            min_value: 100,
            min_ratio: 0.01,
            min_region_area: 500,
        }
    }

    /// Warning yellow and orange.
    pub fn warning() -> Self {
        Self {
            hue_ranges: vec![[15, 35]],
            min_saturation: 100,
            min_value: 100,
            min_ratio: 0.02,
            min_region_area: 500,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.hue_ranges.is_empty() {
            return Err(PipelineError::config(format!("{name}: hue_ranges is empty")));
        }
        for [lo, hi] in &self.hue_ranges {
            if lo > hi || *hi > 180 {
                return Err(PipelineError::config(format!(
                    "{name}: invalid hue range [{lo}, {hi}]"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.min_ratio) {
            return Err(PipelineError::config(format!(
                "{name}: min_ratio must be in [0, 1]"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlankConfig {
    pub max_std_dev: f64,
    pub white_level: u8,
    pub black_level: u8,
    pub min_uniform_ratio: f64,
}

impl Default for BlankConfig {
    fn default() -> Self {
        Self {
            max_std_dev: 20.0,
            white_level: 240,
            black_level: 15,
            min_uniform_ratio: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    /// Max center offset as a fraction of frame width/height.
    pub center_tolerance: f64,
    pub min_area_ratio: f64,
    pub max_area_ratio: f64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Share of edge pixels that must sit on the bbox outline.
    pub min_border_ratio: f64,
    pub max_background_std: f64,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            center_tolerance: 0.3,
            min_area_ratio: 0.05,
            max_area_ratio: 0.8,
            min_aspect: 0.5,
            max_aspect: 3.0,
            min_border_ratio: 0.85,
            max_background_std: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadingConfig {
    pub center_tolerance: f64,
    pub min_radius: u32,
    pub max_radius: u32,
    /// Allowed distance from the fitted radius, as a fraction of it.
    pub radius_tolerance: f64,
    pub min_ring_ratio: f64,
    pub min_octants: u32,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            center_tolerance: 0.3,
            min_radius: 20,
            max_radius: 100,
            radius_tolerance: 0.1,
            min_ring_ratio: 0.75,
            min_octants: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Video only: classify every Nth decoded frame.
    pub sampling_interval: u64,
    pub batch_size: usize,
    /// Luma gradient (|gx| + |gy|) above which a pixel counts as an edge.
    pub edge_threshold: u16,
    #[serde(default = "ColorBandConfig::red")]
    pub red: ColorBandConfig,
    #[serde(default = "ColorBandConfig::warning")]
    pub warning: ColorBandConfig,
    pub blank: BlankConfig,
    pub dialog: DialogConfig,
    pub loading: LoadingConfig,
    pub output: OutputConfig,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            sampling_interval: 10,
            batch_size: 32,
            edge_threshold: 40,
            red: ColorBandConfig::red(),
            warning: ColorBandConfig::warning(),
            blank: BlankConfig::default(),
            dialog: DialogConfig::default(),
            loading: LoadingConfig::default(),
            output: OutputConfig::for_anomalies(),
        }
    }
}

impl AnomalyConfig {
    /// Defaults with a different video sampling interval.
    pub fn with_interval(sampling_interval: u64) -> Self {
        Self {
            sampling_interval,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sampling_interval == 0 {
            return Err(PipelineError::config("sampling_interval must be >= 1"));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be >= 1"));
        }
        self.red.validate("red")?;
        self.warning.validate("warning")?;
        if self.loading.min_radius > self.loading.max_radius {
            return Err(PipelineError::config("loading: min_radius > max_radius"));
        }
        if self.loading.min_octants > 8 {
            return Err(PipelineError::config("loading: min_octants must be <= 8"));
        }
        self.output.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Luma difference above which a pixel counts as changed.
    pub pixel_threshold: u8,
    /// Connected changes smaller than this are treated as noise.
    pub min_region_pixels: usize,
    /// Regions whose bboxes are within this many pixels are merged.
    pub merge_gap: u32,
    pub output: OutputConfig,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            pixel_threshold: 30,
            min_region_pixels: 100,
            merge_gap: 8,
            output: OutputConfig::for_diff(),
        }
    }
}

impl DiffConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_region_pixels == 0 {
            return Err(PipelineError::config("min_region_pixels must be >= 1"));
        }
        self.output.validate()
    }
}

/// Vision pricing used for the cost estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTable {
    pub pixels_per_token: f64,
    pub usd_per_million_tokens: f64,
    pub jpy_per_usd: f64,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self {
            pixels_per_token: 750.0,
            usd_per_million_tokens: 15.0,
            jpy_per_usd: 150.0,
        }
    }
}

impl PriceTable {
    pub fn validate(&self) -> Result<()> {
        if !(self.pixels_per_token > 0.0) {
            return Err(PipelineError::config("pixels_per_token must be > 0"));
        }
        if self.usd_per_million_tokens < 0.0 || self.jpy_per_usd < 0.0 {
            return Err(PipelineError::config("prices must be non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub keyframe: KeyframeConfig,
    pub anomaly: AnomalyConfig,
    pub diff: DiffConfig,
    pub price: PriceTable,
    /// Classification threads; 0 uses every CPU.
    pub workers: usize,
}

impl PipelineConfig {
    /// Parses a JSON5 document; missing fields keep their defaults, including
    /// fields missing from a partially overridden nested preset.
    pub fn from_json5_str(text: &str) -> Result<Self> {
        let overrides: Value =
            json5::from_str(text).map_err(|e| PipelineError::config(e.to_string()))?;
        let mut merged = serde_json::to_value(PipelineConfig::default())?;
        overlay(&mut merged, overrides);
        let config: PipelineConfig =
            serde_json::from_value(merged).map_err(|e| PipelineError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.keyframe.validate()?;
        self.anomaly.validate()?;
        self.diff.validate()?;
        self.price.validate()
    }

    /// Classification threads to spawn.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }
}

/// Recursively replaces the fields of `base` that `overrides` sets.
fn overlay(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let kf = OutputConfig::for_keyframes();
        assert_eq!(kf.quality, 30);
        assert!((kf.scale - 0.3).abs() < 1e-9);

        let an = OutputConfig::for_anomalies();
        assert_eq!(an.quality, 50);
        assert_eq!(OutputConfig::for_diff().quality, 85);
    }

    #[test]
    fn test_threshold_out_of_range() {
        for t in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let config = KeyframeConfig::with_threshold(t);
            assert!(matches!(
                config.validate(),
                Err(PipelineError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = AnomalyConfig::with_interval(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scale_and_quality_rejected() {
        let mut output = OutputConfig::default();
        output.scale = 0.0;
        assert!(output.validate().is_err());

        output.scale = 0.5;
        output.quality = 0;
        assert!(output.validate().is_err());

        output.quality = 101;
        assert!(output.validate().is_err());
    }

    #[test]
    fn test_from_json5_partial() {
        let config = PipelineConfig::from_json5_str(
            r#"{
                // comments are allowed
                keyframe: { threshold: 0.9 },
                anomaly: { sampling_interval: 5 },
                workers: 2,
            }"#,
        )
        .unwrap();

        assert!((config.keyframe.threshold - 0.9).abs() < 1e-9);
        assert_eq!(config.keyframe.max_frames, 100);
        assert_eq!(config.anomaly.sampling_interval, 5);
        assert_eq!(config.worker_count(), 2);
    }

    #[test]
    fn test_from_json5_invalid_value() {
        let err = PipelineConfig::from_json5_str("{ diff: { output: { quality: 0 } } }").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_partial_band_override_keeps_its_preset() {
        use crate::core::analysis::{AnomalyClassifier, AnomalyKind};
        use crate::core::video::frame::test_support::{fill_rect, frame, solid};
        use std::path::Path;

        let config =
            PipelineConfig::from_json5_str("{ anomaly: { warning: { min_ratio: 0.05 } } }").unwrap();
        assert_eq!(config.anomaly.warning.hue_ranges, vec![[15, 35]]);
        assert!((config.anomaly.warning.min_ratio - 0.05).abs() < 1e-9);
        assert_eq!(config.anomaly.red, ColorBandConfig::red());

        let mut banner = solid(80, 60, [240, 240, 240]);
        fill_rect(&mut banner, 0, 0, 80, 12, [255, 190, 0]);
        let kind = AnomalyClassifier::new(&config.anomaly)
            .classify(&frame(0, banner), Path::new("shot.png"))
            .map(|event| event.kind);
        assert_eq!(kind, Some(AnomalyKind::WarningColor));
    }

    #[test]
    fn test_partial_output_override_keeps_its_preset() {
        let config = PipelineConfig::from_json5_str(
            "{ anomaly: { output: { quality: 60 } }, keyframe: { output: { quality: 20 } } }",
        )
        .unwrap();
        assert_eq!(config.anomaly.output.quality, 60);
        assert!((config.anomaly.output.scale - 0.5).abs() < 1e-9);
        assert_eq!(config.keyframe.output.quality, 20);
        assert!((config.keyframe.output.scale - 0.3).abs() < 1e-9);
        assert_eq!(config.diff.output, OutputConfig::for_diff());
    }

    #[test]
    fn test_overrides_replace_lists_whole() {
        let config = PipelineConfig::from_json5_str(
            "{ anomaly: { red: { hue_ranges: [[0, 8]] } } }",
        )
        .unwrap();
        assert_eq!(config.anomaly.red.hue_ranges, vec![[0, 8]]);
        assert_eq!(config.anomaly.red.min_region_area, 500);
    }

    #[test]
    fn test_partial_band_without_layering_is_rejected() {
        let parsed = serde_json::from_str::<AnomalyConfig>(r#"{ "warning": { "min_ratio": 0.05 } }"#);
        assert!(parsed.is_err());

        let whole: AnomalyConfig = serde_json::from_str(r#"{ "sampling_interval": 3 }"#).unwrap();
        assert_eq!(whole.warning, ColorBandConfig::warning());
    }
}
