//! Keyframe extraction runs.

use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::core::config::{KeyframeConfig, PipelineConfig, PriceTable};
use crate::core::cost::CostEstimate;
use crate::core::error::Result;
use crate::core::render::OutputRenderer;
use crate::core::report::{FrameFailure, KeyframeOutput, KeyframeReport};
use crate::core::video::{format_timestamp, open_source, select, Frame};

/// Reduces a recording to the frames where the screen actually changed.
///
/// ```no_run
/// use evidence_lens::api::KeyframeExtractor;
/// use evidence_lens::core::PipelineConfig;
/// use std::path::Path;
///
/// let extractor = KeyframeExtractor::create(&PipelineConfig::default())?;
/// let report = extractor.extract(Path::new("run.mp4"), Path::new("out/keyframes"))?;
/// println!("{}", report);
/// # Ok::<(), evidence_lens::core::PipelineError>(())
/// ```
pub struct KeyframeExtractor {
    config: KeyframeConfig,
    prices: PriceTable,
    renderer: OutputRenderer,
}

impl KeyframeExtractor {
    /// Validates the whole configuration before anything is decoded.
    pub fn create(config: &PipelineConfig) -> Result<Self> {
        crate::init_logging();
        config.validate()?;
        info!(
            "🎬 KeyframeExtractor: threshold {:.2}, max {} frames",
            config.keyframe.threshold, config.keyframe.max_frames
        );
        Ok(Self {
            config: config.keyframe.clone(),
            prices: config.price.clone(),
            renderer: OutputRenderer::new(&config.keyframe.output),
        })
    }

    /// Opens `source` (video or still image) and writes its keyframes to `out_dir`.
    pub fn extract(&self, source: &Path, out_dir: &Path) -> Result<KeyframeReport> {
        let frames = open_source(source)?;
        self.extract_from(frames, source, out_dir)
    }

    /// Runs over any frame stream; `source` only labels the report.
    ///
    /// A corrupt frame is recorded and skipped. Any other decode error ends
    /// the run, keeping what was written so far; if nothing was decoded yet
    /// the error is returned instead.
    pub fn extract_from<I>(&self, frames: I, source: &Path, out_dir: &Path) -> Result<KeyframeReport>
    where
        I: IntoIterator<Item = Result<Frame>>,
    {
        fs::create_dir_all(out_dir)?;
        info!("🚀 extracting keyframes from {}", source.display());

        let mut keyframes = select(frames, &self.config);
        let mut outputs = Vec::new();
        let mut skipped = Vec::new();

        for item in keyframes.by_ref() {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) if e.is_frame_local() => {
                    warn!("⚠️ skipping frame: {}", e);
                    skipped.push(FrameFailure::from_error(&e));
                    continue;
                }
                Err(e) => {
                    if outputs.is_empty() && skipped.is_empty() {
                        return Err(e);
                    }
                    warn!("⚠️ stopping extraction: {}", e);
                    skipped.push(FrameFailure::from_error(&e));
                    break;
                }
            };

            let path = out_dir.join(format!("keyframe_{:04}.jpg", frame.index()));
            let encoded = self.renderer.write(frame.pixels(), &path)?;
            info!(
                "📸 keyframe {} @ {} -> {}",
                frame.index(),
                format_timestamp(frame.timestamp()),
                path.display()
            );
            outputs.push(KeyframeOutput {
                frame_index: frame.index(),
                timestamp_ms: frame.timestamp().as_millis() as u64,
                timestamp: format_timestamp(frame.timestamp()),
                path,
                width: encoded.width,
                height: encoded.height,
                size_bytes: encoded.bytes,
            });
        }

        let stats = keyframes.stats();
        let total_size_bytes: u64 = outputs.iter().map(|k| k.size_bytes as u64).sum();
        let cost = CostEstimate::estimate(outputs.iter().map(|k| (k.width, k.height)), &self.prices);
        info!(
            "✅ {} keyframes from {} frames ({})",
            outputs.len(),
            stats.frames_seen,
            cost
        );

        Ok(KeyframeReport {
            source: source.to_path_buf(),
            output_dir: out_dir.to_path_buf(),
            threshold: self.config.threshold,
            frames_seen: stats.frames_seen,
            keyframes: outputs,
            total_size_bytes,
            limit_reached: keyframes.limit_reached(),
            skipped_frames: skipped,
            cost,
        })
    }
}

impl Drop for KeyframeExtractor {
    fn drop(&mut self) {
        info!("🗑️ KeyframeExtractor: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PipelineError;
    use crate::core::video::frame::test_support::{fill_rect, frame, solid};

    fn scenes(count: u64, hold: u64) -> Vec<Result<Frame>> {
        (0..count)
            .map(|i| {
                let mut image = solid(200, 100, [245, 245, 245]);
                let step = ((i / hold) % 4) as u32;
                fill_rect(&mut image, step * 50, 0, 50, 100, [20, 20, 20]);
                Ok(frame(i, image))
            })
            .collect()
    }

    #[test]
    fn test_writes_keyframes_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = KeyframeExtractor::create(&PipelineConfig::default()).unwrap();

        let report = extractor
            .extract_from(scenes(30, 10), Path::new("run.mp4"), dir.path())
            .unwrap();

        let indices: Vec<u64> = report.keyframes.iter().map(|k| k.frame_index).collect();
        assert_eq!(indices, vec![0, 10, 20]);
        assert_eq!(report.frames_seen, 30);
        assert!(!report.limit_reached);

        let first = &report.keyframes[0];
        assert_eq!(first.path, dir.path().join("keyframe_0000.jpg"));
        assert!(first.path.exists());
        // 0.3 scale preset.
        assert_eq!((first.width, first.height), (60, 30));
        assert_eq!(report.cost.image_count, 3);
        assert_eq!(report.cost.estimated_tokens, 3 * (60 * 30 / 750));

        let on_disk = std::fs::metadata(&first.path).unwrap().len();
        assert_eq!(first.size_bytes as u64, on_disk);
        let total: u64 = report.keyframes.iter().map(|k| k.size_bytes as u64).sum();
        assert_eq!(report.total_size_bytes, total);
    }

    #[test]
    fn test_corrupt_frame_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut frames = scenes(30, 10);
        frames[5] = Err(PipelineError::corrupt("run.mp4", Some(5), "bad packet"));

        let report = KeyframeExtractor::create(&PipelineConfig::default())
            .unwrap()
            .extract_from(frames, Path::new("run.mp4"), dir.path())
            .unwrap();
        assert_eq!(report.keyframes.len(), 3);
        assert_eq!(report.skipped_frames.len(), 1);
        assert_eq!(report.skipped_frames[0].frame_index, Some(5));
    }

    #[test]
    fn test_invalid_config_fails_before_decoding() {
        let mut config = PipelineConfig::default();
        config.keyframe.threshold = 1.5;
        let err = KeyframeExtractor::create(&config).err().unwrap();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn test_single_image_source() {
        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("shot.png");
        solid(100, 100, [1, 2, 3]).save(&shot).unwrap();

        let report = KeyframeExtractor::create(&PipelineConfig::default())
            .unwrap()
            .extract(&shot, &dir.path().join("out"))
            .unwrap();
        assert_eq!(report.keyframes.len(), 1);
        assert!(dir.path().join("out/keyframe_0000.jpg").exists());
    }

    #[test]
    fn test_unreadable_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = KeyframeExtractor::create(&PipelineConfig::default())
            .unwrap()
            .extract(&dir.path().join("missing.png"), dir.path())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
