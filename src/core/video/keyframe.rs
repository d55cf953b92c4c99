use log::debug;

use super::frame::Frame;
use super::similarity::SimilarityScorer;
use crate::core::config::KeyframeConfig;
use crate::core::error::Result;

/// Counters for a keyframe pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionStats {
    pub frames_seen: u64,
    pub frames_kept: u64,
    pub decode_failures: u64,
}

/// Why a frame was kept or dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionDecision {
    First,
    Changed { similarity: f64 },
    TooSimilar { similarity: f64 },
    TooClose,
}

impl SelectionDecision {
    pub fn is_kept(&self) -> bool {
        matches!(self, SelectionDecision::First | SelectionDecision::Changed { .. })
    }
}

/// Greedy deduplication against the last kept frame.
///
/// A frame is kept when its similarity to the last keyframe is below the
/// threshold and at least `min_gap_frames` indices have passed since it.
pub struct KeyframeSelector {
    scorer: SimilarityScorer,
    threshold: f64,
    min_gap_frames: u64,
    last_kept: Option<Frame>,
}

impl KeyframeSelector {
    pub fn new(config: &KeyframeConfig) -> Self {
        Self {
            scorer: SimilarityScorer::new(),
            threshold: config.threshold,
            min_gap_frames: config.min_gap_frames,
            last_kept: None,
        }
    }

    /// Decides without recording anything.
    pub fn decide(&self, frame: &Frame) -> Result<SelectionDecision> {
        let Some(last) = self.last_kept.as_ref() else {
            return Ok(SelectionDecision::First);
        };

        if frame.index().saturating_sub(last.index()) < self.min_gap_frames {
            return Ok(SelectionDecision::TooClose);
        }

        let similarity = self.scorer.score(last.pixels(), frame.pixels())?;
        if similarity < self.threshold {
            Ok(SelectionDecision::Changed { similarity })
        } else {
            Ok(SelectionDecision::TooSimilar { similarity })
        }
    }

    /// Returns the frame back when it becomes a keyframe.
    pub fn offer(&mut self, frame: Frame) -> Result<Option<Frame>> {
        let decision = self.decide(&frame)?;
        debug!("frame {}: {:?}", frame.index(), decision);
        if decision.is_kept() {
            self.last_kept = Some(frame.clone());
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }
}

/// Lazy keyframe stream over a frame source.
///
/// Decode errors from the source are passed through so the caller can record
/// them; selection continues with the next frame. Stops pulling from the
/// source once `max_frames` keyframes were emitted.
pub struct Keyframes<I> {
    source: I,
    selector: KeyframeSelector,
    max_frames: usize,
    stats: SelectionStats,
}

impl<I> Keyframes<I>
where
    I: Iterator<Item = Result<Frame>>,
{
    /// Counters so far; final once the iterator is exhausted.
    pub fn stats(&self) -> SelectionStats {
        self.stats
    }

    /// `max_frames` keyframes were emitted.
    pub fn limit_reached(&self) -> bool {
        self.stats.frames_kept as usize >= self.max_frames
    }
}

impl<I> Iterator for Keyframes<I>
where
    I: Iterator<Item = Result<Frame>>,
{
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.limit_reached() {
            let frame = match self.source.next()? {
                Ok(frame) => frame,
                Err(e) => {
                    self.stats.decode_failures += 1;
                    return Some(Err(e));
                }
            };
            self.stats.frames_seen += 1;

            match self.selector.offer(frame) {
                Ok(Some(kept)) => {
                    self.stats.frames_kept += 1;
                    return Some(Ok(kept));
                }
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

/// Wraps `source` in a lazy keyframe selector.
pub fn select<I>(source: I, config: &KeyframeConfig) -> Keyframes<I::IntoIter>
where
    I: IntoIterator<Item = Result<Frame>>,
{
    Keyframes {
        source: source.into_iter(),
        selector: KeyframeSelector::new(config),
        max_frames: config.max_frames,
        stats: SelectionStats::default(),
    }
}
