//! Two-tier validation of detected regions.
//!
//! [`DetectionRules`] decides which regions are real detections. [`QualityThresholds`]
//! then inspects each detection against independently enabled checks and
//! [`Verdict::assess`] folds the outcomes into a frame-level pass/fail.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contours::ContourFeatures;
use crate::result::{DetectionMeasurement, DetectionResult};

/// Confidence reported whenever at least one item is detected.
pub const DETECTION_CONFIDENCE: f64 = 0.85;

/// Coarse acceptance bounds. A region is a detection only if its area,
/// circularity and aspect ratio all fall inside these inclusive ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionRules {
    pub min_area: f64,
    pub max_area: f64,
    pub min_circularity: f64,
    pub max_circularity: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub expected_count: usize,
    /// When set, a final count other than `expected_count` fails the frame.
    pub enforce_count: bool,
}

impl Default for DetectionRules {
    fn default() -> Self {
        Self {
            min_area: 500.0,
            max_area: 50_000.0,
            min_circularity: 0.3,
            max_circularity: 1.0,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 2.0,
            expected_count: 0,
            enforce_count: false,
        }
    }
}

impl DetectionRules {
    pub fn accepts(&self, features: &ContourFeatures) -> bool {
        (self.min_area..=self.max_area).contains(&features.area)
            && (self.min_circularity..=self.max_circularity).contains(&features.circularity)
            && (self.min_aspect_ratio..=self.max_aspect_ratio).contains(&features.aspect_ratio)
    }

    /// True if `count` violates an enforced expected count.
    pub fn count_mismatch(&self, count: usize) -> bool {
        self.enforce_count && count != self.expected_count
    }
}

/// Per-item and per-frame inspection standard.
///
/// Every check has its own enable flag. A bound of zero means "no constraint"
/// on that side. The `fail_on_*` triggers decide which kinds of violation fail
/// the whole frame; violations whose trigger is off are still reported.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub enable_area_check: bool,
    pub enable_width_check: bool,
    pub enable_height_check: bool,
    pub enable_aspect_ratio_check: bool,
    pub enable_circularity_check: bool,
    pub enable_count_check: bool,

    pub expected_count: usize,
    pub enforce_exact_count: bool,
    pub min_count: usize,
    pub max_count: usize,

    pub min_area: f64,
    pub max_area: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub min_height: f64,
    pub max_height: f64,

    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
    pub min_circularity: f64,
    pub max_circularity: f64,

    pub fail_on_undersized: bool,
    pub fail_on_oversized: bool,
    pub fail_on_count_mismatch: bool,
    pub fail_on_shape_defects: bool,
}

/// A per-item measured quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Area,
    Width,
    Height,
    AspectRatio,
    Circularity,
}

impl Metric {
    /// Evaluation order of the per-item checks.
    pub const ALL: [Metric; 5] = [
        Metric::Area,
        Metric::Width,
        Metric::Height,
        Metric::AspectRatio,
        Metric::Circularity,
    ];

    fn label(self) -> &'static str {
        match self {
            Metric::Area => "Area",
            Metric::Width => "Width",
            Metric::Height => "Length",
            Metric::AspectRatio => "Aspect ratio",
            Metric::Circularity => "Circularity",
        }
    }

    /// Size metrics produce under/oversized faults, the rest shape defects.
    pub fn is_size(self) -> bool {
        matches!(self, Metric::Area | Metric::Width | Metric::Height)
    }

    pub fn value(self, measurement: &DetectionMeasurement) -> f64 {
        match self {
            Metric::Area => measurement.area_pixels,
            Metric::Width => measurement.width_pixels,
            Metric::Height => measurement.height_pixels,
            Metric::AspectRatio => measurement.aspect_ratio,
            Metric::Circularity => measurement.circularity,
        }
    }

    fn format_value(self, value: f64) -> String {
        match self {
            Metric::Area => format!("{}px²", value as i64),
            Metric::Width | Metric::Height => format!("{}px", value as i64),
            Metric::AspectRatio | Metric::Circularity => format!("{value:.6}"),
        }
    }
}

/// Which side of a check was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Min,
    Max,
}

/// Frame-level category a per-item violation escalates into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Undersized,
    Oversized,
    ShapeDefect,
}

/// One violated per-item check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemFault {
    pub metric: Metric,
    pub bound: Bound,
    pub value: f64,
    pub limit: f64,
}

impl ItemFault {
    pub fn kind(&self) -> FaultKind {
        match (self.metric.is_size(), self.bound) {
            (true, Bound::Min) => FaultKind::Undersized,
            (true, Bound::Max) => FaultKind::Oversized,
            (false, _) => FaultKind::ShapeDefect,
        }
    }
}

impl fmt::Display for ItemFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match (self.metric.is_size(), self.bound) {
            (true, Bound::Min) => "too small",
            (true, Bound::Max) => "too large",
            (false, Bound::Min) => "too low",
            (false, Bound::Max) => "too high",
        };
        write!(
            f,
            "{} {} ({})",
            self.metric.label(),
            direction,
            self.metric.format_value(self.value)
        )
    }
}

/// The configured bounds of one per-item check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityCheck {
    pub metric: Metric,
    pub enabled: bool,
    pub min: f64,
    pub max: f64,
}

impl QualityCheck {
    /// Violations of this check by `value`. A disabled check never fires; a
    /// zero bound is not enforced.
    pub fn violations(self, value: f64) -> impl Iterator<Item = ItemFault> {
        let fault = |bound, limit| ItemFault {
            metric: self.metric,
            bound,
            value,
            limit,
        };
        let below = (self.enabled && self.min > 0.0 && value < self.min)
            .then(|| fault(Bound::Min, self.min));
        let above = (self.enabled && self.max > 0.0 && value > self.max)
            .then(|| fault(Bound::Max, self.max));
        below.into_iter().chain(above)
    }
}

/// The count limit that was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountLimit {
    Expected(usize),
    Min(usize),
    Max(usize),
}

impl fmt::Display for CountLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountLimit::Expected(n) => write!(f, "expected {n}"),
            CountLimit::Min(n) => write!(f, "min {n}"),
            CountLimit::Max(n) => write!(f, "max {n}"),
        }
    }
}

/// A frame-level count violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountFault {
    TooLow { count: usize, limit: CountLimit },
    TooHigh { count: usize, limit: CountLimit },
}

impl fmt::Display for CountFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountFault::TooLow { count, limit } => write!(f, "COUNT TOO LOW: {count} ({limit})"),
            CountFault::TooHigh { count, limit } => write!(f, "COUNT TOO HIGH: {count} ({limit})"),
        }
    }
}

impl QualityThresholds {
    /// The per-item check for `metric`.
    pub fn check(&self, metric: Metric) -> QualityCheck {
        let (enabled, min, max) = match metric {
            Metric::Area => (self.enable_area_check, self.min_area, self.max_area),
            Metric::Width => (self.enable_width_check, self.min_width, self.max_width),
            Metric::Height => (self.enable_height_check, self.min_height, self.max_height),
            Metric::AspectRatio => (
                self.enable_aspect_ratio_check,
                self.min_aspect_ratio,
                self.max_aspect_ratio,
            ),
            Metric::Circularity => (
                self.enable_circularity_check,
                self.min_circularity,
                self.max_circularity,
            ),
        };
        QualityCheck {
            metric,
            enabled,
            min,
            max,
        }
    }

    /// Every violated per-item check, in evaluation order.
    pub fn item_faults(&self, measurement: &DetectionMeasurement) -> Vec<ItemFault> {
        Metric::ALL
            .iter()
            .flat_map(|&metric| self.check(metric).violations(metric.value(measurement)))
            .collect()
    }

    /// Runs the per-item checks and records the outcome on `measurement`.
    pub fn inspect(&self, measurement: &mut DetectionMeasurement) {
        for fault in self.item_faults(measurement) {
            measurement.record_fault(fault);
        }
    }

    /// The count violation for `count`, if the count check is enabled and violated.
    pub fn count_fault(&self, count: usize) -> Option<CountFault> {
        if !self.enable_count_check {
            return None;
        }

        if self.enforce_exact_count {
            let limit = CountLimit::Expected(self.expected_count);
            return match count.cmp(&self.expected_count) {
                std::cmp::Ordering::Less => Some(CountFault::TooLow { count, limit }),
                std::cmp::Ordering::Greater => Some(CountFault::TooHigh { count, limit }),
                std::cmp::Ordering::Equal => None,
            };
        }

        if self.min_count > 0 && count < self.min_count {
            Some(CountFault::TooLow {
                count,
                limit: CountLimit::Min(self.min_count),
            })
        } else if self.max_count > 0 && count > self.max_count {
            Some(CountFault::TooHigh {
                count,
                limit: CountLimit::Max(self.max_count),
            })
        } else {
            None
        }
    }
}

/// Frame-level outcome of the quality assessment.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub is_valid: bool,
    pub confidence: f64,
    pub message: String,
    pub fault_count_low: bool,
    pub fault_count_high: bool,
    pub fault_undersized: bool,
    pub fault_oversized: bool,
    pub fault_shape_defect: bool,
    pub fault_messages: Vec<String>,
}

impl Verdict {
    /// Folds per-item outcomes and the final count into a pass/fail verdict.
    pub fn assess(
        rules: &DetectionRules,
        thresholds: &QualityThresholds,
        measurements: &[DetectionMeasurement],
    ) -> Self {
        let count = measurements.len();
        let mut verdict = Self {
            is_valid: true,
            confidence: if count > 0 { DETECTION_CONFIDENCE } else { 0.0 },
            message: String::new(),
            fault_count_low: false,
            fault_count_high: false,
            fault_undersized: false,
            fault_oversized: false,
            fault_shape_defect: false,
            fault_messages: Vec::new(),
        };

        if let Some(fault) = thresholds.count_fault(count) {
            match fault {
                CountFault::TooLow { .. } => verdict.fault_count_low = true,
                CountFault::TooHigh { .. } => verdict.fault_count_high = true,
            }
            verdict.fault_messages.push(fault.to_string());
        }

        let rules_mismatch = rules.count_mismatch(count);
        if rules_mismatch {
            verdict.fault_messages.push(format!(
                "COUNT MISMATCH: {count} (rules expect {})",
                rules.expected_count
            ));
        }

        for measurement in measurements.iter().filter(|m| !m.meets_specs) {
            for fault in &measurement.faults {
                match fault.kind() {
                    FaultKind::Undersized => verdict.fault_undersized = true,
                    FaultKind::Oversized => verdict.fault_oversized = true,
                    FaultKind::ShapeDefect => verdict.fault_shape_defect = true,
                }
            }
            verdict.fault_messages.push(format!(
                "Detection #{}: {}",
                measurement.id, measurement.fault_reason
            ));
        }

        let count_failed = verdict.fault_count_low || verdict.fault_count_high;
        verdict.is_valid = !(rules_mismatch
            || (thresholds.fail_on_count_mismatch && count_failed)
            || (thresholds.fail_on_undersized && verdict.fault_undersized)
            || (thresholds.fail_on_oversized && verdict.fault_oversized)
            || (thresholds.fail_on_shape_defects && verdict.fault_shape_defect));

        verdict.message = if verdict.is_valid {
            "PASS".to_string()
        } else {
            format!("FAIL: {} fault(s)", verdict.fault_messages.len())
        };

        verdict
    }

    /// Copies the verdict onto `result`.
    pub fn apply_to(self, result: &mut DetectionResult) {
        result.is_valid = self.is_valid;
        result.confidence = self.confidence;
        result.message = self.message;
        result.fault_count_low = self.fault_count_low;
        result.fault_count_high = self.fault_count_high;
        result.fault_undersized = self.fault_undersized;
        result.fault_oversized = self.fault_oversized;
        result.fault_shape_defect = self.fault_shape_defect;
        result.fault_messages = self.fault_messages;
    }
}
