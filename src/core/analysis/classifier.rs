use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::debug;
use serde::{Deserialize, Serialize};

use super::detectors::{Detection, FrameFeatures, DETECTORS};
use crate::core::config::AnomalyConfig;
use crate::core::geometry::Rect;
use crate::core::video::frame::{format_timestamp, Frame};

/// Anomaly urgency. Orders `Info < Warning < Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Sort key; higher is more severe.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Warning => 1,
            Severity::Error => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    RedError,
    BlankScreen,
    WarningColor,
    Dialog,
    Loading,
}

impl AnomalyKind {
    /// Fixed severity per kind.
    pub fn severity(&self) -> Severity {
        match self {
            AnomalyKind::RedError | AnomalyKind::BlankScreen => Severity::Error,
            AnomalyKind::WarningColor => Severity::Warning,
            AnomalyKind::Dialog | AnomalyKind::Loading => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::RedError => "red_error",
            AnomalyKind::BlankScreen => "blank_screen",
            AnomalyKind::WarningColor => "warning_color",
            AnomalyKind::Dialog => "dialog",
            AnomalyKind::Loading => "loading",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One anomalous frame. At most one event exists per frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyEvent {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    pub timestamp: String,
    #[serde(rename = "category")]
    pub severity: Severity,
    #[serde(rename = "subtype")]
    pub kind: AnomalyKind,
    pub bbox: Option<Rect>,
    pub source_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub metrics: BTreeMap<&'static str, f64>,
}

impl AnomalyEvent {
    pub fn from_detection(frame: &Frame, source_path: &Path, detection: Detection) -> Self {
        Self {
            frame_index: frame.index(),
            timestamp_ms: frame.timestamp().as_millis() as u64,
            timestamp: format_timestamp(frame.timestamp()),
            severity: detection.kind.severity(),
            kind: detection.kind,
            bbox: detection.bbox,
            source_path: source_path.to_path_buf(),
            output_path: None,
            metrics: detection.metrics,
        }
    }

    /// `anomaly_<frame:06>_<severity>.jpg`
    pub fn file_name(&self) -> String {
        format!("anomaly_{:06}_{}.jpg", self.frame_index, self.severity)
    }
}

/// Runs the detector chain over single frames.
#[derive(Debug, Clone)]
pub struct AnomalyClassifier {
    config: AnomalyConfig,
}

impl AnomalyClassifier {
    pub fn new(config: &AnomalyConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// First detector hit in chain order, if any.
    pub fn detect(&self, image: &RgbImage) -> Option<Detection> {
        let features = FrameFeatures::new(image, self.config.edge_threshold);
        DETECTORS
            .iter()
            .find_map(|detector| detector(&features, &self.config))
    }

    /// Classifies one frame; `source_path` is recorded on the event.
    pub fn classify(&self, frame: &Frame, source_path: &Path) -> Option<AnomalyEvent> {
        let detection = self.detect(frame.pixels())?;
        debug!(
            "frame {} @ {}: {} ({})",
            frame.index(),
            format_timestamp(frame.timestamp()),
            detection.kind,
            detection.kind.severity()
        );
        Some(AnomalyEvent::from_detection(frame, source_path, detection))
    }
}
