use std::path::Path;

use log::{debug, info, warn};
use rayon::prelude::*;

use super::classifier::{AnomalyClassifier, AnomalyEvent};
use crate::core::config::AnomalyConfig;
use crate::core::error::{PipelineError, Result};
use crate::core::report::FrameFailure;
use crate::core::video::frame::Frame;

/// How frames are picked and how hard failures end the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Every `sampling_interval`-th frame; a container-level error stops the scan.
    Video { sampling_interval: u64 },
    /// Every image; a bad image only loses its own slot.
    Images,
}

impl ScanMode {
    fn samples(&self, frame: &Frame) -> bool {
        match self {
            ScanMode::Video { sampling_interval } => frame.index() % (*sampling_interval).max(1) == 0,
            ScanMode::Images => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub frames_decoded: u64,
    pub frames_classified: u64,
    pub decode_failures: u64,
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Ordered by frame index.
    pub events: Vec<AnomalyEvent>,
    pub failures: Vec<FrameFailure>,
    pub stats: ScanStats,
}

/// Batches sampled frames and classifies each batch on a dedicated pool.
pub struct AnomalyScanner {
    classifier: AnomalyClassifier,
    pool: rayon::ThreadPool,
    batch_size: usize,
}

impl AnomalyScanner {
    /// Builds a pool of `workers` threads named `anomaly-<n>`.
    pub fn new(config: &AnomalyConfig, workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("anomaly-{}", i))
            .build()
            .map_err(|e| PipelineError::config(format!("worker pool: {}", e)))?;
        Ok(Self {
            classifier: AnomalyClassifier::new(config),
            pool,
            batch_size: config.batch_size.max(1),
        })
    }

    /// Classifies `frames` and hands each hit to `on_event` in frame order.
    ///
    /// `on_event` runs on the calling thread and may fill in the event's
    /// output path. An error from it aborts the scan.
    pub fn scan<I, F>(
        &self,
        frames: I,
        mode: ScanMode,
        source_path: &Path,
        mut on_event: F,
    ) -> Result<ScanOutcome>
    where
        I: IntoIterator<Item = Result<Frame>>,
        F: FnMut(&Frame, &mut AnomalyEvent) -> Result<()>,
    {
        let mut outcome = ScanOutcome::default();
        let mut batch = Vec::with_capacity(self.batch_size);

        for item in frames {
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    outcome.stats.decode_failures += 1;
                    let fatal = matches!(mode, ScanMode::Video { .. }) && !e.is_frame_local();
                    warn!("⚠️ {}: {}", source_path.display(), e);
                    outcome.failures.push(FrameFailure::from_error(&e));
                    if fatal {
                        warn!("⚠️ stopping scan of {}", source_path.display());
                        break;
                    }
                    continue;
                }
            };
            outcome.stats.frames_decoded += 1;

            if !mode.samples(&frame) {
                continue;
            }
            batch.push(frame);
            if batch.len() >= self.batch_size {
                self.flush(&mut batch, source_path, &mut outcome, &mut on_event)?;
            }
        }
        self.flush(&mut batch, source_path, &mut outcome, &mut on_event)?;

        info!(
            "🔍 {}: {} decoded, {} classified, {} anomalies, {} failures",
            source_path.display(),
            outcome.stats.frames_decoded,
            outcome.stats.frames_classified,
            outcome.events.len(),
            outcome.stats.decode_failures
        );
        Ok(outcome)
    }

    fn flush<F>(
        &self,
        batch: &mut Vec<Frame>,
        source_path: &Path,
        outcome: &mut ScanOutcome,
        on_event: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&Frame, &mut AnomalyEvent) -> Result<()>,
    {
        if batch.is_empty() {
            return Ok(());
        }
        let frames = std::mem::take(batch);
        outcome.stats.frames_classified += frames.len() as u64;
        debug!("classifying batch of {} frames", frames.len());

        let classifier = &self.classifier;
        let mut hits: Vec<(Frame, AnomalyEvent)> = self.pool.install(|| {
            frames
                .into_par_iter()
                .filter_map(|frame| {
                    let event = classifier.classify(&frame, source_path)?;
                    Some((frame, event))
                })
                .collect()
        });
        hits.sort_by_key(|(frame, _)| frame.index());

        for (frame, mut event) in hits {
            on_event(&frame, &mut event)?;
            outcome.events.push(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analysis::classifier::AnomalyKind;
    use crate::core::video::frame::test_support::{frame, solid};

    fn neutral() -> image::RgbImage {
        image::RgbImage::from_fn(64, 64, |x, y| {
            let v = 100 + ((x + y) % 16) as u8 * 4;
            image::Rgb([v, v, v])
        })
    }

    /// 300 frames of neutral content with a red screen on `red` indices.
    fn clip(red: impl Fn(u64) -> bool) -> Vec<Result<Frame>> {
        (0..300)
            .map(|i| {
                let image = if red(i) { solid(64, 64, [220, 0, 0]) } else { neutral() };
                Ok(frame(i, image))
            })
            .collect()
    }

    fn scanner(batch_size: usize) -> AnomalyScanner {
        let config = AnomalyConfig {
            batch_size,
            ..AnomalyConfig::default()
        };
        AnomalyScanner::new(&config, 2).unwrap()
    }

    #[test]
    fn test_persistent_red_screen_found_on_sampled_frame() {
        let outcome = scanner(32)
            .scan(
                clip(|i| (145..=150).contains(&i)),
                ScanMode::Video { sampling_interval: 10 },
                Path::new("run.mp4"),
                |_, _| Ok(()),
            )
            .unwrap();

        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].frame_index, 150);
        assert_eq!(outcome.events[0].kind, AnomalyKind::RedError);
        assert_eq!(outcome.stats.frames_decoded, 300);
        assert_eq!(outcome.stats.frames_classified, 30);
    }

    #[test]
    fn test_single_unsampled_frame_is_missed() {
        let outcome = scanner(32)
            .scan(
                clip(|i| i == 145),
                ScanMode::Video { sampling_interval: 10 },
                Path::new("run.mp4"),
                |_, _| Ok(()),
            )
            .unwrap();
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn test_events_ordered_across_batches() {
        let outcome = scanner(3)
            .scan(
                clip(|i| i % 20 == 0),
                ScanMode::Video { sampling_interval: 10 },
                Path::new("run.mp4"),
                |_, _| Ok(()),
            )
            .unwrap();
        let indices: Vec<u64> = outcome.events.iter().map(|e| e.frame_index).collect();
        assert_eq!(indices, (0..300).step_by(20).collect::<Vec<u64>>());
    }

    #[test]
    fn test_images_mode_classifies_everything() {
        let outcome = scanner(4)
            .scan(
                clip(|i| i == 7).into_iter().take(10),
                ScanMode::Images,
                Path::new("shots"),
                |_, _| Ok(()),
            )
            .unwrap();
        assert_eq!(outcome.stats.frames_classified, 10);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].frame_index, 7);
    }

    #[test]
    fn test_frame_errors_are_recorded() {
        let mut frames = clip(|i| i == 20);
        frames[10] = Err(PipelineError::corrupt("run.mp4", Some(10), "bad packet"));

        let outcome = scanner(8)
            .scan(
                frames,
                ScanMode::Video { sampling_interval: 10 },
                Path::new("run.mp4"),
                |_, _| Ok(()),
            )
            .unwrap();
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].frame_index, Some(10));
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.stats.frames_decoded, 299);
    }

    #[test]
    fn test_container_error_stops_video_scan() {
        let mut frames = clip(|i| i == 200);
        frames[100] = Err(PipelineError::corrupt("run.mp4", None, "truncated"));

        let outcome = scanner(8)
            .scan(
                frames,
                ScanMode::Video { sampling_interval: 10 },
                Path::new("run.mp4"),
                |_, _| Ok(()),
            )
            .unwrap();
        assert_eq!(outcome.stats.frames_decoded, 100);
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.failures[0].frame_index, None);
    }

    #[test]
    fn test_sink_error_aborts() {
        let result = scanner(8).scan(
            clip(|i| i == 0),
            ScanMode::Images,
            Path::new("shots"),
            |_, _| Err(PipelineError::config("disk full")),
        );
        assert!(result.is_err());
    }
}
