pub mod frame;
pub mod keyframe;
pub mod similarity;
pub mod source;

#[cfg(feature = "video")]
pub mod decoder;

#[cfg(feature = "video")]
pub use decoder::VideoSource;
pub use frame::{format_timestamp, Frame};
pub use keyframe::{select, KeyframeSelector, Keyframes, SelectionDecision, SelectionStats};
pub use similarity::SimilarityScorer;
pub use source::{open_source, FrameStream, ImageListSource};
