//! Run reports and the sinks they are delivered to.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use log::info;
use serde::Serialize;

use super::analysis::{AnomalyEvent, Severity};
use super::cost::CostEstimate;
use super::diff::{DiffRegion, SimilarityBand};
use super::error::{PipelineError, Result};

/// A frame or image that could not be decoded and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameFailure {
    pub frame_index: Option<u64>,
    pub reason: String,
}

impl FrameFailure {
    pub fn from_error(err: &PipelineError) -> Self {
        Self {
            frame_index: err.frame_index(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyframeOutput {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    pub timestamp: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Encoded JPEG size.
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyframeReport {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub threshold: f64,
    pub frames_seen: u64,
    pub keyframes: Vec<KeyframeOutput>,
    pub total_size_bytes: u64,
    /// Extraction stopped at `max_frames`.
    pub limit_reached: bool,
    pub skipped_frames: Vec<FrameFailure>,
    pub cost: CostEstimate,
}

impl fmt::Display for KeyframeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🎞️ keyframes for {}", self.source.display())?;
        writeln!(
            f,
            "  {} of {} frames kept (threshold {:.2}){}",
            self.keyframes.len(),
            self.frames_seen,
            self.threshold,
            if self.limit_reached { ", limit reached" } else { "" }
        )?;
        for kf in &self.keyframes {
            writeln!(
                f,
                "  [{}] frame {} -> {} ({:.1} KB)",
                kf.timestamp,
                kf.frame_index,
                kf.path.display(),
                kf.size_bytes as f64 / 1024.0
            )?;
        }
        writeln!(f, "  total size: {:.2} MB", self.total_size_mb())?;
        if !self.skipped_frames.is_empty() {
            writeln!(f, "  {} frames skipped", self.skipped_frames.len())?;
        }
        write!(f, "  cost: {}", self.cost)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub frames_decoded: u64,
    pub frames_classified: u64,
    /// Most severe first, then by time.
    pub events: Vec<AnomalyEvent>,
    pub skipped_frames: Vec<FrameFailure>,
    pub cost: CostEstimate,
}

impl KeyframeReport {
    /// `total_size_bytes` in MiB.
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Stable sort: severity rank descending, then timestamp ascending.
pub fn sort_events(events: &mut [AnomalyEvent]) {
    events.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then(a.timestamp_ms.cmp(&b.timestamp_ms))
    });
}

impl AnomalyReport {
    /// Events of one severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.events.iter().filter(|e| e.severity == severity).count()
    }
}

fn severity_icon(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "🔴",
        Severity::Warning => "🟡",
        Severity::Info => "🔵",
    }
}

impl fmt::Display for AnomalyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🔍 anomalies in {}", self.source.display())?;
        writeln!(
            f,
            "  {} error / {} warning / {} info across {} classified frames",
            self.count(Severity::Error),
            self.count(Severity::Warning),
            self.count(Severity::Info),
            self.frames_classified
        )?;
        for event in &self.events {
            write!(
                f,
                "  {} [{}] {} @ {} (frame {})",
                severity_icon(event.severity),
                event.severity,
                event.kind,
                event.timestamp,
                event.frame_index
            )?;
            match &event.output_path {
                Some(path) => writeln!(f, " -> {}", path.display())?,
                None => writeln!(f)?,
            }
        }
        if !self.skipped_frames.is_empty() {
            writeln!(f, "  {} frames skipped", self.skipped_frames.len())?;
        }
        write!(f, "  cost: {}", self.cost)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReport {
    pub baseline: PathBuf,
    pub candidate: PathBuf,
    pub output_dir: PathBuf,
    pub similarity_percent: f64,
    pub band: SimilarityBand,
    pub status: String,
    pub resized: bool,
    pub regions: Vec<DiffRegion>,
    pub artifacts: Vec<PathBuf>,
    pub cost: CostEstimate,
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "🆚 {} vs {}",
            self.baseline.display(),
            self.candidate.display()
        )?;
        writeln!(
            f,
            "  similarity {:.2}%: {} ({} regions){}",
            self.similarity_percent,
            self.status,
            self.regions.len(),
            if self.resized { ", candidate resized" } else { "" }
        )?;
        for region in &self.regions {
            let b = region.bbox;
            writeln!(
                f,
                "  region ({}, {}) {}x{}, {} px",
                b.x, b.y, b.width, b.height, region.pixel_count
            )?;
        }
        write!(f, "  cost: {}", self.cost)
    }
}

/// Any of the run reports.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "kind", content = "report", rename_all = "snake_case")]
pub enum Report<'a> {
    Keyframes(&'a KeyframeReport),
    Anomalies(&'a AnomalyReport),
    Diff(&'a DiffReport),
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Keyframes(r) => fmt::Display::fmt(r, f),
            Report::Anomalies(r) => fmt::Display::fmt(r, f),
            Report::Diff(r) => fmt::Display::fmt(r, f),
        }
    }
}

/// Where finished reports go.
pub trait ReportSink {
    fn deliver(&mut self, report: Report<'_>) -> Result<()>;
}

/// Logs the human-readable summary at `info`.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn deliver(&mut self, report: Report<'_>) -> Result<()> {
        for line in report.to_string().lines() {
            info!("{}", line);
        }
        Ok(())
    }
}

/// Writes each report as one pretty-printed JSON document.
pub struct JsonSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the writer, e.g. the buffer in tests.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn deliver(&mut self, report: Report<'_>) -> Result<()> {
        serde_json::to_writer_pretty(&mut self.writer, &report)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}
