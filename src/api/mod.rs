//! Entry points used by the review tooling. Each run validates its config,
//! writes artifacts under a caller-chosen directory and returns a report.

pub mod anomaly;
pub mod compare;
pub mod keyframes;

pub use anomaly::AnomalyDetector;
pub use compare::ScreenshotComparer;
pub use keyframes::KeyframeExtractor;
