//! Frame sources.
//!
//! A source is any forward-only iterator of `Result<Frame>`. Sources are not
//! restartable: a second pass means opening the media again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;

use super::frame::Frame;
use crate::core::error::{PipelineError, Result};

pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "webm"];

/// Case-insensitive match on [`VIDEO_EXTENSIONS`].
pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Decodes a single still image into a frame.
pub fn load_image(path: &Path, index: u64) -> Result<Frame> {
    if !path.exists() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )));
    }
    let image = image::open(path).map_err(|e| PipelineError::from_image(path, e))?;
    Frame::from_dynamic(index, Duration::ZERO, image).map_err(|e| match e {
        PipelineError::InvalidImage(msg) => {
            PipelineError::InvalidImage(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Lazily decodes still images; frame index is the list position.
pub struct ImageListSource {
    paths: std::vec::IntoIter<PathBuf>,
    next_index: u64,
}

impl ImageListSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        Self {
            paths: paths.into_iter(),
            next_index: 0,
        }
    }
}

impl Iterator for ImageListSource {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let index = self.next_index;
        self.next_index += 1;
        debug!("🖼️ decoding image {} -> frame {}", path.display(), index);

        // A broken image only loses its own slot.
        Some(load_image(&path, index).map_err(|e| match e {
            PipelineError::CorruptMedia { path, reason, .. } => PipelineError::CorruptMedia {
                path,
                frame_index: Some(index),
                reason,
            },
            other => other,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

/// Boxed frame stream, as returned by [`open_source`].
pub type FrameStream = Box<dyn Iterator<Item = Result<Frame>>>;

/// Opens a video or a still image based on the file extension.
pub fn open_source(path: &Path) -> Result<FrameStream> {
    if is_video_path(path) {
        open_video(path)
    } else {
        Ok(Box::new(ImageListSource::new([path.to_path_buf()])))
    }
}

#[cfg(feature = "video")]
fn open_video(path: &Path) -> Result<FrameStream> {
    Ok(Box::new(super::decoder::VideoSource::open(path)?))
}

#[cfg(not(feature = "video"))]
fn open_video(path: &Path) -> Result<FrameStream> {
    log::warn!(
        "⚠️ {} looks like a video but the `video` feature is disabled",
        path.display()
    );
    Err(PipelineError::UnsupportedFormat {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::frame::test_support::solid;

    #[test]
    fn test_is_video_path() {
        assert!(is_video_path(Path::new("run/session.MP4")));
        assert!(is_video_path(Path::new("a.webm")));
        assert!(!is_video_path(Path::new("shot.png")));
        assert!(!is_video_path(Path::new("noext")));
    }

    #[test]
    fn test_image_list_continues_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        solid(20, 10, [1, 2, 3]).save(&good).unwrap();
        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"not a png").unwrap();
        let missing = dir.path().join("missing.png");

        let results: Vec<_> = ImageListSource::new([broken, missing, good]).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_err());
        assert!(results[1].is_err());

        let frame = results[2].as_ref().unwrap();
        assert_eq!(frame.index(), 2);
        assert_eq!((frame.width(), frame.height()), (20, 10));
    }

    #[test]
    fn test_broken_image_reports_frame_index() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"\x89PNG\r\n\x1a\ngarbage").unwrap();

        let err = ImageListSource::new([broken]).next().unwrap().unwrap_err();
        assert_eq!(err.frame_index(), Some(0));
    }

    #[cfg(not(feature = "video"))]
    #[test]
    fn test_video_without_feature_is_unsupported() {
        let err = open_source(Path::new("clip.mp4")).err().unwrap();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }
}
