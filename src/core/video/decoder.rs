//! FFmpeg-backed video frame source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next as ffmpeg;
use ffmpeg::util::error::EAGAIN;
use log::{info, warn};

use super::frame::Frame;
use crate::core::error::{PipelineError, Result};

/// Stream properties read once at open.
#[derive(Debug, Clone, Copy)]
struct VideoInfo {
    width: u32,
    height: u32,
    fps: f64,
    duration: Duration,
}

/// Decodes packets on demand and yields RGB frames in decode order.
pub struct VideoSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    time_base: f64,
    info: VideoInfo,
    next_index: u64,
    draining: bool,
    finished: bool,
}

impl VideoSource {
    /// Opens the best video stream of `path` and prepares its decoder.
    pub fn open(path: &Path) -> Result<Self> {
        ffmpeg::init().map_err(|e| PipelineError::corrupt(path, None, e))?;

        let input = ffmpeg::format::input(&path).map_err(|e| match e {
            ffmpeg::Error::InvalidData | ffmpeg::Error::DecoderNotFound => {
                PipelineError::UnsupportedFormat {
                    path: path.to_path_buf(),
                }
            }
            other => PipelineError::corrupt(path, None, other),
        })?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
            })?;
        let stream_index = stream.index();
        let time_base = f64::from(stream.time_base());
        let fps = f64::from(stream.avg_frame_rate());

        let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|_| PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
            })?;

        let duration_us = input.duration().max(0) as f64;
        let info = VideoInfo {
            width: decoder.width(),
            height: decoder.height(),
            fps,
            duration: Duration::from_secs_f64(duration_us / f64::from(ffmpeg::ffi::AV_TIME_BASE)),
        };

        info!(
            "🎬 opened {}: {}x{} @ {:.2} fps, {:.2}s",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.duration.as_secs_f64()
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            stream_index,
            decoder,
            scaler: None,
            time_base,
            info,
            next_index: 0,
            draining: false,
            finished: false,
        })
    }

    fn convert(&mut self, decoded: &ffmpeg::util::frame::video::Video) -> Result<Frame> {
        let index = self.next_index;
        self.next_index += 1;

        let (width, height) = (decoded.width(), decoded.height());
        if self.scaler.is_none() {
            let scaler = ffmpeg::software::scaling::context::Context::get(
                decoded.format(),
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::flag::Flags::BILINEAR,
            )
            .map_err(|e| PipelineError::corrupt(&self.path, Some(index), e))?;
            self.scaler = Some(scaler);
        }

        let mut rgb = ffmpeg::util::frame::video::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .run(decoded, &mut rgb)
                .map_err(|e| PipelineError::corrupt(&self.path, Some(index), e))?;
        }

        // Rows are padded to the stride; copy out a tightly packed buffer.
        let stride = rgb.stride(0);
        let row_len = width as usize * 3;
        let plane = rgb.data(0);
        let mut data = Vec::with_capacity(row_len * height as usize);
        for y in 0..height as usize {
            let start = y * stride;
            let row = plane.get(start..start + row_len).ok_or_else(|| {
                PipelineError::corrupt(&self.path, Some(index), "short RGB plane")
            })?;
            data.extend_from_slice(row);
        }

        let timestamp = match decoded.pts() {
            Some(pts) if pts >= 0 => Duration::from_secs_f64(pts as f64 * self.time_base),
            _ if self.info.fps > 0.0 => Duration::from_secs_f64(index as f64 / self.info.fps),
            _ => Duration::ZERO,
        };

        Frame::from_rgb(index, timestamp, width, height, data)
    }
}

/// What a `receive_frame` result means for the read loop.
#[derive(Debug, PartialEq)]
enum Received {
    Frame,
    NeedsInput,
    Drained,
    Failed(ffmpeg::Error),
}

fn received(result: std::result::Result<(), ffmpeg::Error>) -> Received {
    match result {
        Ok(()) => Received::Frame,
        Err(ffmpeg::Error::Other { errno }) if errno == EAGAIN => Received::NeedsInput,
        Err(ffmpeg::Error::Eof) => Received::Drained,
        Err(e) => Received::Failed(e),
    }
}

impl Iterator for VideoSource {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished {
                return None;
            }

            let mut decoded = ffmpeg::util::frame::video::Video::empty();
            match received(self.decoder.receive_frame(&mut decoded)) {
                Received::Frame => return Some(self.convert(&decoded)),
                Received::NeedsInput if !self.draining => {}
                Received::NeedsInput | Received::Drained => {
                    self.finished = true;
                    return None;
                }
                Received::Failed(e) => {
                    // The frame is lost but keeps its index so sampling stays aligned.
                    let index = self.next_index;
                    self.next_index += 1;
                    warn!("⚠️ {}: frame {} failed to decode: {}", self.path.display(), index, e);
                    if self.draining {
                        self.finished = true;
                    }
                    return Some(Err(PipelineError::corrupt(&self.path, Some(index), e)));
                }
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        let index = self.next_index;
                        self.next_index += 1;
                        warn!("⚠️ {}: packet for frame {} rejected: {}", self.path.display(), index, e);
                        return Some(Err(PipelineError::corrupt(&self.path, Some(index), e)));
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.draining = true;
                    if let Err(e) = self.decoder.send_eof() {
                        // Buffered frames can't be flushed; report the tail as lost.
                        self.finished = true;
                        warn!("⚠️ {}: flushing decoder failed: {}", self.path.display(), e);
                        return Some(Err(PipelineError::corrupt(&self.path, None, e)));
                    }
                }
                Err(e) => {
                    // Container-level failure: nothing after this is trustworthy.
                    self.finished = true;
                    return Some(Err(PipelineError::corrupt(&self.path, None, e)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_results() {
        assert_eq!(received(Ok(())), Received::Frame);
        assert_eq!(
            received(Err(ffmpeg::Error::Other { errno: EAGAIN })),
            Received::NeedsInput
        );
        assert_eq!(received(Err(ffmpeg::Error::Eof)), Received::Drained);
        assert_eq!(
            received(Err(ffmpeg::Error::InvalidData)),
            Received::Failed(ffmpeg::Error::InvalidData)
        );
    }

    #[test]
    fn test_decode_error_is_frame_local() {
        let err = PipelineError::corrupt("run.mp4", Some(7), ffmpeg::Error::InvalidData);
        assert!(err.is_frame_local());
        assert_eq!(err.frame_index(), Some(7));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(VideoSource::open(&dir.path().join("missing.mp4")).is_err());
    }
}
