//! Color-based vision inspection of dough pieces on a production belt.
//!
//! A [`VisionPipeline`] takes one camera frame at a time through HSV color
//! segmentation, region-of-interest restriction, contour extraction and
//! rule-based quality checks, and returns a [`DetectionResult`] with the
//! count, per-item measurements, fault flags and stage timings.
//!
//! The modules follow the processing order: [`hsv`] and [`segmentation`]
//! produce a binary mask, [`contours`] and [`rect`] measure the blobs in it,
//! and [`rules`] decides whether the frame passes.

mod colors;
pub mod config;
pub mod contours;
pub mod error;
pub mod hsv;
pub mod overlay;
pub mod pipeline;
pub mod rect;
pub mod result;
pub mod rules;
pub mod segmentation;
pub mod stats;

pub use config::{PipelineConfig, Recipe, RoiRect};
pub use error::{ConfigError, ConfigResult};
pub use hsv::{Frame, HsvConverter, HsvFrame};
pub use pipeline::VisionPipeline;
pub use result::{DetectionMeasurement, DetectionResult};
pub use rules::{DetectionRules, QualityThresholds};
pub use segmentation::ColorRange;
pub use stats::PerformanceStats;
