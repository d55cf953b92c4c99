//! Heuristic anomaly classification.

pub mod classifier;
pub mod color;
pub mod detectors;
pub mod scanner;

pub use classifier::{AnomalyClassifier, AnomalyEvent, AnomalyKind, Severity};
pub use detectors::{Detection, FrameFeatures};
pub use scanner::{AnomalyScanner, ScanMode, ScanOutcome, ScanStats};
