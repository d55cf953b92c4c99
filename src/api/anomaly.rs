//! Anomaly detection runs over recordings and screenshot sets.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::core::analysis::{AnomalyScanner, ScanMode};
use crate::core::config::{PipelineConfig, PriceTable};
use crate::core::cost::CostEstimate;
use crate::core::error::Result;
use crate::core::render::OutputRenderer;
use crate::core::report::{sort_events, AnomalyReport};
use crate::core::video::source::is_video_path;
use crate::core::video::{open_source, Frame, ImageListSource};

/// Flags error, warning and info screens in test evidence.
pub struct AnomalyDetector {
    scanner: AnomalyScanner,
    sampling_interval: u64,
    prices: PriceTable,
    renderer: OutputRenderer,
}

impl AnomalyDetector {
    /// Validates `config` and starts the classification pool.
    pub fn create(config: &PipelineConfig) -> Result<Self> {
        crate::init_logging();
        config.validate()?;
        let workers = config.worker_count();
        info!(
            "🔍 AnomalyDetector: every {} frames, {} workers",
            config.anomaly.sampling_interval, workers
        );
        Ok(Self {
            scanner: AnomalyScanner::new(&config.anomaly, workers)?,
            sampling_interval: config.anomaly.sampling_interval,
            prices: config.price.clone(),
            renderer: OutputRenderer::new(&config.anomaly.output),
        })
    }

    /// Scans a video (sampled) or a single screenshot.
    pub fn detect(&self, source: &Path, out_dir: &Path) -> Result<AnomalyReport> {
        if is_video_path(source) {
            let frames = open_source(source)?;
            self.detect_frames(
                frames,
                ScanMode::Video {
                    sampling_interval: self.sampling_interval,
                },
                source,
                out_dir,
            )
        } else {
            self.detect_in_images(&[source.to_path_buf()], out_dir)
        }
    }

    /// Classifies every image; each event points at its own file.
    pub fn detect_in_images(&self, paths: &[PathBuf], out_dir: &Path) -> Result<AnomalyReport> {
        let label = match paths {
            [single] => single.clone(),
            _ => paths
                .first()
                .and_then(|p| p.parent())
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };
        let frames = ImageListSource::new(paths.iter().cloned());
        self.run(frames, ScanMode::Images, &label, out_dir, |frame| {
            paths.get(frame.index() as usize).cloned()
        })
    }

    /// Scans any frame stream; `source` labels the report and its events.
    pub fn detect_frames<I>(
        &self,
        frames: I,
        mode: ScanMode,
        source: &Path,
        out_dir: &Path,
    ) -> Result<AnomalyReport>
    where
        I: IntoIterator<Item = Result<Frame>>,
    {
        self.run(frames, mode, source, out_dir, |_| None)
    }

    fn run<I, F>(
        &self,
        frames: I,
        mode: ScanMode,
        source: &Path,
        out_dir: &Path,
        frame_source: F,
    ) -> Result<AnomalyReport>
    where
        I: IntoIterator<Item = Result<Frame>>,
        F: Fn(&Frame) -> Option<PathBuf>,
    {
        fs::create_dir_all(out_dir)?;
        info!("🚀 scanning {} for anomalies", source.display());

        let mut written = Vec::new();
        let outcome = self.scanner.scan(frames, mode, source, |frame, event| {
            if let Some(path) = frame_source(frame) {
                event.source_path = path;
            }
            let path = out_dir.join(event.file_name());
            let image = self.renderer.anomaly(frame.pixels(), event);
            let encoded = self.renderer.write(&image, &path)?;
            info!(
                "🚨 [{}] {} @ {} -> {}",
                event.severity,
                event.kind,
                event.timestamp,
                path.display()
            );
            written.push((encoded.width, encoded.height));
            event.output_path = Some(path);
            Ok(())
        })?;

        let mut events = outcome.events;
        sort_events(&mut events);
        let cost = CostEstimate::estimate(written, &self.prices);

        Ok(AnomalyReport {
            source: source.to_path_buf(),
            output_dir: out_dir.to_path_buf(),
            frames_decoded: outcome.stats.frames_decoded,
            frames_classified: outcome.stats.frames_classified,
            events,
            skipped_frames: outcome.failures,
            cost,
        })
    }
}

impl Drop for AnomalyDetector {
    fn drop(&mut self) {
        info!("🗑️ AnomalyDetector: released");
    }
}
