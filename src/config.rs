//! Configuration value objects.
//!
//! Every struct here is replaced wholesale rather than edited field by field
//! while frames are being processed. All of them deserialize from JSON with
//! missing fields taking their defaults.

use std::path::Path;

use image::math::Rect;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::pipeline::VisionPipeline;
use crate::rules::{DetectionRules, QualityThresholds};
use crate::segmentation::{ColorRange, DEFAULT_KERNEL_SIZE};

/// Serializable region of interest. A zero width or height disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for RoiRect {
    /// The full 640x480 frame.
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 640,
            height: 480,
        }
    }
}

impl From<RoiRect> for Rect {
    fn from(roi: RoiRect) -> Self {
        Rect {
            x: roi.x,
            y: roi.y,
            width: roi.width,
            height: roi.height,
        }
    }
}

impl From<Rect> for RoiRect {
    fn from(rect: Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

/// Everything [`VisionPipeline::initialize`] needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub color_range: ColorRange,
    pub roi: RoiRect,
    pub detection_rules: DetectionRules,
    pub quality_thresholds: QualityThresholds,
    pub morph_kernel_size: u32,
    pub enable_preprocessing: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            color_range: ColorRange::default(),
            roi: RoiRect::default(),
            detection_rules: DetectionRules::default(),
            quality_thresholds: QualityThresholds::default(),
            morph_kernel_size: DEFAULT_KERNEL_SIZE,
            enable_preprocessing: true,
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::io(path, source))?;
        Self::from_json(&json)
    }

    /// Like [`load`](Self::load), but logs the failure and returns the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self::load(path).unwrap_or_else(|err| {
            warn!(
                path = %path.display(),
                error = %err,
                "could not load vision config, using defaults"
            );
            Self::default()
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.color_range.validate()?;
        validate_kernel_size(self.morph_kernel_size)
    }
}

fn validate_kernel_size(size: u32) -> ConfigResult<()> {
    use crate::segmentation::MAX_KERNEL_SIZE;
    if size == 0 || size > MAX_KERNEL_SIZE {
        return Err(ConfigError::InvalidKernelSize {
            size,
            max: MAX_KERNEL_SIZE,
        });
    }
    Ok(())
}

/// Free-text bookkeeping carried with a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipeMetadata {
    pub created_date: String,
    pub modified_date: String,
    pub created_by: String,
}

/// A named inspection setup for one product, applied to a pipeline in one go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub name: String,
    pub description: String,
    pub color_range: ColorRange,
    pub roi: RoiRect,
    pub detection_rules: DetectionRules,
    pub quality_thresholds: QualityThresholds,
    pub morph_kernel_size: u32,
    pub enable_preprocessing: bool,
    pub metadata: RecipeMetadata,
}

impl Default for Recipe {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            color_range: ColorRange::default(),
            roi: RoiRect::default(),
            detection_rules: DetectionRules::default(),
            quality_thresholds: QualityThresholds::default(),
            morph_kernel_size: 5,
            enable_preprocessing: true,
            metadata: RecipeMetadata::default(),
        }
    }
}

impl Recipe {
    /// Captures the pipeline's current configuration under `name`.
    pub fn from_pipeline(name: impl Into<String>, pipeline: &VisionPipeline) -> Self {
        Self {
            name: name.into(),
            color_range: pipeline.color_range(),
            roi: pipeline.roi().into(),
            detection_rules: pipeline.detection_rules(),
            quality_thresholds: pipeline.quality_thresholds(),
            morph_kernel_size: pipeline.morph_kernel_size(),
            enable_preprocessing: pipeline.preprocessing(),
            ..Self::default()
        }
    }

    /// Validates the recipe, then applies it through the pipeline's mutators.
    ///
    /// Nothing is applied if validation fails.
    pub fn apply_to(&self, pipeline: &mut VisionPipeline) -> ConfigResult<()> {
        self.color_range.validate()?;
        validate_kernel_size(self.morph_kernel_size)?;

        pipeline.update_color_range(self.color_range);
        pipeline.update_roi(self.roi.into());
        pipeline.update_detection_rules(self.detection_rules);
        pipeline.update_quality_thresholds(self.quality_thresholds);
        pipeline.update_morph_kernel_size(self.morph_kernel_size)?;
        pipeline.update_preprocessing(self.enable_preprocessing);
        Ok(())
    }
}
