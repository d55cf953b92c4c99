pub mod analysis;
pub mod components;
pub mod config;
pub mod cost;
pub mod diff;
pub mod error;
pub mod geometry;
pub mod render;
pub mod report;
pub mod video;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
