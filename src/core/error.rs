use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Which side of a two-image comparison failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSide {
    Baseline,
    Candidate,
}

impl fmt::Display for ImageSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSide::Baseline => f.write_str("baseline"),
            ImageSide::Candidate => f.write_str("candidate"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("unsupported format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("corrupt media {}{}: {reason}", .path.display(), frame_suffix(.frame_index))]
    CorruptMedia {
        path: PathBuf,
        frame_index: Option<u64>,
        reason: String,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{side} image failed: {source}")]
    Comparison {
        side: ImageSide,
        #[source]
        source: Box<PipelineError>,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn frame_suffix(frame_index: &Option<u64>) -> String {
    match frame_index {
        Some(index) => format!(" (frame {})", index),
        None => String::new(),
    }
}

impl PipelineError {
    /// Shorthand for [`PipelineError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }

    /// `frame_index` is `None` for container-level failures.
    pub fn corrupt(path: impl Into<PathBuf>, frame_index: Option<u64>, reason: impl fmt::Display) -> Self {
        PipelineError::CorruptMedia {
            path: path.into(),
            frame_index,
            reason: reason.to_string(),
        }
    }

    /// Maps an `image` crate failure for `path` onto the pipeline error kinds.
    pub fn from_image(path: impl Into<PathBuf>, err: image::ImageError) -> Self {
        let path = path.into();
        match err {
            image::ImageError::Unsupported(_) => PipelineError::UnsupportedFormat { path },
            image::ImageError::IoError(e) if e.kind() == std::io::ErrorKind::NotFound => {
                PipelineError::Io(e)
            }
            // Truncated files surface as IO errors from the decoders.
            image::ImageError::IoError(e) => PipelineError::corrupt(path, None, e),
            image::ImageError::Limits(e) => {
                PipelineError::InvalidImage(format!("{}: {}", path.display(), e))
            }
            other => PipelineError::corrupt(path, None, other),
        }
    }

    /// Frame index attached to the error, if any.
    pub fn frame_index(&self) -> Option<u64> {
        match self {
            PipelineError::CorruptMedia { frame_index, .. } => *frame_index,
            PipelineError::Comparison { source, .. } => source.frame_index(),
            _ => None,
        }
    }

    /// A corrupt frame can be skipped; everything else ends the stream.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            PipelineError::CorruptMedia {
                frame_index: Some(_),
                ..
            }
        )
    }
}
