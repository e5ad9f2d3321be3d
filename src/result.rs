//! Per-frame inspection output.

use image::math::Rect;
use imageproc::{contours::Contour, point::Point};

use crate::contours::ContourFeatures;
use crate::rules::ItemFault;

/// Measurements and verdict for one accepted detection.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionMeasurement {
    /// 1-based, assigned in the order detections survive acceptance.
    pub id: usize,
    pub area_pixels: f64,
    pub width_pixels: f64,
    pub height_pixels: f64,
    pub aspect_ratio: f64,
    pub circularity: f64,
    pub center: Point<f32>,
    pub bbox: Rect,
    pub meets_specs: bool,
    /// Comma-joined description of every violated check, empty when none.
    pub fault_reason: String,
    /// The same violations in structured form.
    pub faults: Vec<ItemFault>,
}

impl DetectionMeasurement {
    /// A measurement with no faults recorded yet.
    pub fn from_features(id: usize, features: &ContourFeatures) -> Self {
        Self {
            id,
            area_pixels: features.area,
            width_pixels: features.bounding_box.width as f64,
            height_pixels: features.bounding_box.height as f64,
            aspect_ratio: features.aspect_ratio,
            circularity: features.circularity,
            center: features.center,
            bbox: features.bounding_box,
            meets_specs: true,
            fault_reason: String::new(),
            faults: Vec::new(),
        }
    }

    /// Records a violated check.
    pub fn record_fault(&mut self, fault: ItemFault) {
        if !self.fault_reason.is_empty() {
            self.fault_reason.push_str(", ");
        }
        self.fault_reason.push_str(&fault.to_string());
        self.meets_specs = false;
        self.faults.push(fault);
    }
}

/// Everything the pipeline reports about one frame.
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub contours: Vec<Contour<i32>>,
    pub bounding_boxes: Vec<Rect>,
    pub centers: Vec<Point<f32>>,
    pub measurements: Vec<DetectionMeasurement>,

    pub dough_count: usize,
    /// Overall pass/fail.
    pub is_valid: bool,
    /// Coarse heuristic, not a calibrated probability.
    pub confidence: f64,
    pub message: String,

    pub fault_count_low: bool,
    pub fault_count_high: bool,
    pub fault_undersized: bool,
    pub fault_oversized: bool,
    pub fault_shape_defect: bool,
    pub fault_messages: Vec<String>,

    pub segmentation_time_ms: f64,
    pub contour_time_ms: f64,
    pub rule_time_ms: f64,
    pub total_time_ms: f64,
}

impl DetectionResult {
    /// A flagged-invalid result with no detections.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Appends an accepted detection.
    pub(crate) fn push_detection(
        &mut self,
        contour: Contour<i32>,
        measurement: DetectionMeasurement,
    ) {
        self.bounding_boxes.push(measurement.bbox);
        self.centers.push(measurement.center);
        self.contours.push(contour);
        self.measurements.push(measurement);
        self.dough_count = self.measurements.len();
    }
}
