//! Per-frame orchestration: segmentation, ROI restriction, contour extraction,
//! rule evaluation, timing.

use std::path::Path;
use std::time::{Duration, Instant};

use image::{GrayImage, math::Rect};
use tracing::{debug, info, trace, warn};

use crate::config::PipelineConfig;
use crate::contours::{extract_features, find_contours};
use crate::error::ConfigResult;
use crate::hsv::{Frame, HsvConverter, HsvFrame};
use crate::overlay;
use crate::rect;
use crate::result::{DetectionMeasurement, DetectionResult};
use crate::rules::{DetectionRules, QualityThresholds, Verdict};
use crate::segmentation::{ColorRange, ColorSegmenter};
use crate::stats::{FrameTiming, PerformanceStats, PerformanceWindow};

/// Message carried by results for frames that could not be processed.
pub const INVALID_INPUT_MESSAGE: &str = "Invalid frame or not initialized";

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// The frame-inspection pipeline.
///
/// One instance processes one frame at a time. Configuration changes made
/// through the `update_*` methods take effect on the next
/// [`process_frame`](Self::process_frame) call.
#[derive(Debug)]
pub struct VisionPipeline {
    segmenter: ColorSegmenter,
    rules: DetectionRules,
    thresholds: QualityThresholds,
    roi: Rect,
    segmented_mask: GrayImage,
    initialized: bool,
    timings: PerformanceWindow,
}

impl Default for VisionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl VisionPipeline {
    /// An uninitialized pipeline with default configuration and a probed
    /// conversion kernel.
    pub fn new() -> Self {
        Self::with_converter(HsvConverter::detect())
    }

    /// An uninitialized pipeline using `converter` for color conversion.
    pub fn with_converter(converter: HsvConverter) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            segmenter: ColorSegmenter::new(converter),
            rules: defaults.detection_rules,
            thresholds: defaults.quality_thresholds,
            roi: defaults.roi.into(),
            segmented_mask: GrayImage::new(0, 0),
            initialized: false,
            timings: PerformanceWindow::default(),
        }
    }

    /// Loads configuration from `config_path` and marks the pipeline ready.
    ///
    /// A missing or malformed file is logged and replaced by the defaults, so
    /// this always succeeds.
    pub fn initialize(&mut self, config_path: impl AsRef<Path>) -> bool {
        let config = PipelineConfig::load_or_default(config_path);
        self.initialize_with(config)
    }

    /// Applies `config` and marks the pipeline ready.
    ///
    /// An invalid config is logged and replaced by the defaults.
    pub fn initialize_with(&mut self, config: PipelineConfig) -> bool {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                warn!(error = %err, "invalid vision config, using defaults");
                PipelineConfig::default()
            }
        };

        self.segmenter.set_color_range(config.color_range);
        self.segmenter.set_preprocessing(config.enable_preprocessing);
        if let Err(err) = self.segmenter.set_morph_kernel_size(config.morph_kernel_size) {
            warn!(error = %err, "keeping previous morphology kernel");
        }
        self.roi = config.roi.into();
        self.rules = config.detection_rules;
        self.thresholds = config.quality_thresholds;
        self.initialized = true;

        info!(
            kernel = self.segmenter.converter().kernel_name(),
            roi = ?config.roi,
            "vision pipeline initialized"
        );
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Inspects one frame.
    ///
    /// Never panics on bad input: an empty frame, or a call before
    /// initialization, yields a result with zero count, `is_valid == false` and
    /// a diagnostic message. Such a call also empties the diagnostic mask and
    /// HSV frame.
    pub fn process_frame(&mut self, frame: &Frame) -> DetectionResult {
        let total_start = Instant::now();

        if !self.initialized || frame.width() == 0 || frame.height() == 0 {
            debug!(
                initialized = self.initialized,
                width = frame.width(),
                height = frame.height(),
                "rejecting frame"
            );
            self.segmented_mask = GrayImage::new(0, 0);
            self.segmenter.clear_hsv_frame();
            return DetectionResult::rejected(INVALID_INPUT_MESSAGE);
        }

        // Snapshot configuration so the whole frame sees one consistent set.
        let rules = self.rules;
        let thresholds = self.thresholds;
        let roi = self.active_roi();

        let segmentation_start = Instant::now();
        self.segmenter.segment(frame, &mut self.segmented_mask);
        if let Some(roi) = roi {
            restrict_to_roi(&mut self.segmented_mask, &roi);
        }
        let segmentation_ms = millis(segmentation_start.elapsed());

        let contour_start = Instant::now();
        let contours = find_contours(&self.segmented_mask);
        let features = extract_features(&contours);
        let contour_ms = millis(contour_start.elapsed());

        let rule_start = Instant::now();
        let mut result = DetectionResult::default();
        for (contour, features) in contours.into_iter().zip(&features) {
            if !rules.accepts(features) {
                continue;
            }
            if let Some(roi) = roi
                && !rect::contains_point(&roi, features.center)
            {
                continue;
            }

            let mut measurement =
                DetectionMeasurement::from_features(result.measurements.len() + 1, features);
            thresholds.inspect(&mut measurement);
            if !measurement.meets_specs {
                trace!(
                    id = measurement.id,
                    reason = %measurement.fault_reason,
                    "detection out of spec"
                );
            }
            result.push_detection(contour, measurement);
        }
        Verdict::assess(&rules, &thresholds, &result.measurements).apply_to(&mut result);
        let rule_ms = millis(rule_start.elapsed());

        result.segmentation_time_ms = segmentation_ms;
        result.contour_time_ms = contour_ms;
        result.rule_time_ms = rule_ms;
        result.total_time_ms = millis(total_start.elapsed());

        self.timings.record(FrameTiming {
            segmentation_ms,
            contour_ms,
            rule_ms,
            total_ms: result.total_time_ms,
        });

        debug!(
            count = result.dough_count,
            valid = result.is_valid,
            candidates = features.len(),
            total_ms = result.total_time_ms,
            "processed frame"
        );
        result
    }

    /// Draws `result` onto `frame` using the current ROI.
    pub fn render_detections(&self, frame: &mut Frame, result: &DetectionResult) {
        overlay::render_detections(frame, result, self.active_roi());
    }

    pub fn update_color_range(&mut self, range: ColorRange) {
        self.segmenter.set_color_range(range);
    }

    /// Replaces the region of interest. A zero width or height disables it.
    pub fn update_roi(&mut self, roi: Rect) {
        self.roi = roi;
    }

    pub fn update_detection_rules(&mut self, rules: DetectionRules) {
        self.rules = rules;
    }

    pub fn update_quality_thresholds(&mut self, thresholds: QualityThresholds) {
        self.thresholds = thresholds;
    }

    /// Returns the kernel size in effect; even sizes are bumped to odd.
    pub fn update_morph_kernel_size(&mut self, size: u32) -> ConfigResult<u32> {
        self.segmenter.set_morph_kernel_size(size)
    }

    pub fn update_preprocessing(&mut self, enabled: bool) {
        self.segmenter.set_preprocessing(enabled);
    }

    pub fn color_range(&self) -> ColorRange {
        self.segmenter.color_range()
    }

    pub fn roi(&self) -> Rect {
        self.roi
    }

    fn active_roi(&self) -> Option<Rect> {
        rect::is_active(&self.roi).then_some(self.roi)
    }

    pub fn detection_rules(&self) -> DetectionRules {
        self.rules
    }

    pub fn quality_thresholds(&self) -> QualityThresholds {
        self.thresholds
    }

    pub fn morph_kernel_size(&self) -> u32 {
        self.segmenter.morph_kernel_size()
    }

    pub fn preprocessing(&self) -> bool {
        self.segmenter.preprocessing()
    }

    /// Name of the color conversion kernel in use.
    pub fn conversion_kernel(&self) -> &'static str {
        self.segmenter.converter().kernel_name()
    }

    /// Mask of the most recent frame, already restricted to the ROI.
    pub fn segmented_mask(&self) -> &GrayImage {
        &self.segmented_mask
    }

    /// HSV conversion of the most recent frame.
    pub fn hsv_frame(&self) -> &HsvFrame {
        self.segmenter.hsv_frame()
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        self.timings.stats()
    }

    pub fn reset_performance_stats(&mut self) {
        self.timings.clear();
    }
}

/// Zeroes every mask pixel outside `roi`. An ROI that lies entirely outside
/// the mask clears it completely.
pub fn restrict_to_roi(mask: &mut GrayImage, roi: &Rect) {
    let (width, height) = mask.dimensions();
    let clipped = rect::clamp_to(roi, width, height);
    let data: &mut [u8] = &mut **mask;
    if !rect::is_active(&clipped) {
        warn!(?roi, width, height, "ROI lies outside the frame, clearing mask");
        data.fill(0);
        return;
    }

    let x0 = clipped.x as usize;
    let x1 = x0 + clipped.width as usize;
    let y0 = clipped.y;
    let y1 = y0 + clipped.height;
    let row_len = width as usize;
    for (y, row) in data.chunks_exact_mut(row_len).enumerate() {
        let y = y as u32;
        if y < y0 || y >= y1 {
            row.fill(0);
        } else {
            row[..x0].fill(0);
            row[x1..].fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect as DrawRect;

    use crate::rules::DETECTION_CONFIDENCE;

    const DOUGH_BGR: Rgb<u8> = Rgb([120, 200, 230]);
    const BELT_BGR: Rgb<u8> = Rgb([40, 40, 40]);

    fn belt() -> Frame {
        Frame::from_pixel(640, 480, BELT_BGR)
    }

    fn with_blob(mut frame: Frame, center: (i32, i32), radius: i32) -> Frame {
        draw_filled_circle_mut(&mut frame, center, radius, DOUGH_BGR);
        frame
    }

    fn ready_pipeline() -> VisionPipeline {
        let mut pipeline = VisionPipeline::new();
        assert!(pipeline.initialize_with(PipelineConfig::default()));
        pipeline
    }

    fn roi(x: u32, y: u32, width: u32, height: u32) -> Rect {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn uninitialized_pipeline_rejects_frames() {
        let mut pipeline = VisionPipeline::new();
        let result = pipeline.process_frame(&with_blob(belt(), (320, 240), 25));
        assert_eq!(result.dough_count, 0);
        assert!(!result.is_valid);
        assert_eq!(result.message, INVALID_INPUT_MESSAGE);
        assert_eq!(pipeline.performance_stats().frame_count, 0);
    }

    #[test]
    fn empty_frame_is_flagged_invalid() {
        let mut pipeline = ready_pipeline();
        let result = pipeline.process_frame(&Frame::new(0, 0));
        assert_eq!(result.dough_count, 0);
        assert!(!result.is_valid);
        assert!(!result.message.is_empty());

        // The pipeline stays usable.
        let result = pipeline.process_frame(&with_blob(belt(), (320, 240), 25));
        assert_eq!(result.dough_count, 1);
    }

    #[test]
    fn initialize_falls_back_on_missing_config() {
        let mut pipeline = VisionPipeline::new();
        let path = std::env::temp_dir().join("dough-inspect-missing-config.json");
        assert!(pipeline.initialize(&path));
        assert!(pipeline.is_initialized());
        assert_eq!(pipeline.color_range(), ColorRange::default());
        assert_eq!(pipeline.roi(), roi(0, 0, 640, 480));
    }

    #[test]
    fn initialize_reads_config_file() {
        let path = std::env::temp_dir()
            .join(format!("dough-inspect-config-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "roi": { "x": 10, "y": 20, "width": 300, "height": 200 },
                 "color_range": { "lower": [15, 40, 40], "upper": [45, 255, 255] } }"#,
        )
        .unwrap();

        let mut pipeline = VisionPipeline::new();
        assert!(pipeline.initialize(&path));
        std::fs::remove_file(&path).ok();

        assert_eq!(pipeline.roi(), roi(10, 20, 300, 200));
        assert_eq!(pipeline.color_range(), ColorRange::new([15, 40, 40], [45, 255, 255]));
    }

    #[test]
    fn round_blob_passes_area_check() {
        let mut pipeline = ready_pipeline();
        pipeline.update_color_range(ColorRange::new([20, 50, 50], [40, 255, 255]));
        pipeline.update_roi(roi(0, 0, 640, 480));
        pipeline.update_quality_thresholds(QualityThresholds {
            enable_area_check: true,
            min_area: 500.0,
            max_area: 50_000.0,
            fail_on_undersized: true,
            fail_on_oversized: true,
            ..QualityThresholds::default()
        });

        // Radius 25 gives roughly 2000 px² once traced.
        let result = pipeline.process_frame(&with_blob(belt(), (320, 240), 25));
        assert_eq!(result.dough_count, 1);
        assert_eq!(result.measurements.len(), 1);
        let m = &result.measurements[0];
        assert_eq!(m.id, 1);
        assert!(m.area_pixels > 1500.0 && m.area_pixels < 2500.0, "area {}", m.area_pixels);
        assert!(m.circularity > 0.8);
        assert!(m.meets_specs);
        assert!(result.is_valid);
        assert_eq!(result.message, "PASS");
        assert_eq!(result.confidence, DETECTION_CONFIDENCE);
        assert_eq!(result.contours.len(), 1);
        assert_eq!(result.bounding_boxes[0], m.bbox);
        assert_eq!(result.centers[0], m.center);
    }

    #[test]
    fn small_blob_fails_as_undersized() {
        let mut pipeline = ready_pipeline();
        // Let the small blob through coarse acceptance.
        pipeline.update_detection_rules(DetectionRules {
            min_area: 50.0,
            ..DetectionRules::default()
        });
        pipeline.update_quality_thresholds(QualityThresholds {
            enable_area_check: true,
            min_area: 500.0,
            max_area: 50_000.0,
            fail_on_undersized: true,
            ..QualityThresholds::default()
        });

        // Radius 6 traces to roughly 100 px².
        let result = pipeline.process_frame(&with_blob(belt(), (100, 100), 6));
        assert_eq!(result.dough_count, 1);
        let m = &result.measurements[0];
        assert!(!m.meets_specs);
        assert!(m.fault_reason.contains("too small"), "{}", m.fault_reason);
        assert!(result.fault_undersized);
        assert!(!result.is_valid);
        assert!(result.message.starts_with("FAIL"));
    }

    #[test]
    fn missing_piece_fails_exact_count() {
        let mut pipeline = ready_pipeline();
        pipeline.update_quality_thresholds(QualityThresholds {
            enable_count_check: true,
            enforce_exact_count: true,
            expected_count: 3,
            fail_on_count_mismatch: true,
            ..QualityThresholds::default()
        });

        let frame = with_blob(with_blob(belt(), (150, 200), 25), (450, 200), 25);
        let result = pipeline.process_frame(&frame);
        assert_eq!(result.dough_count, 2);
        assert!(result.fault_count_low);
        assert!(!result.fault_count_high);
        assert!(!result.is_valid);
        assert!(
            result
                .fault_messages
                .iter()
                .any(|m| m == "COUNT TOO LOW: 2 (expected 3)")
        );
    }

    #[test]
    fn empty_frame_yields_diagnostic_result() {
        let mut pipeline = ready_pipeline();
        let result = pipeline.process_frame(&Frame::new(0, 0));
        assert_eq!(result.dough_count, 0);
        assert!(!result.is_valid);
        assert!(!result.message.is_empty());
    }

    #[test]
    fn ids_follow_acceptance_order() {
        let mut pipeline = ready_pipeline();
        // A thin strip above the blobs is rejected by the aspect-ratio rule.
        let mut frame = belt();
        draw_filled_rect_mut(&mut frame, DrawRect::at(50, 20).of_size(300, 12), DOUGH_BGR);
        let frame = with_blob(with_blob(frame, (100, 150), 25), (300, 300), 25);

        let result = pipeline.process_frame(&frame);
        let ids: Vec<usize> = result.measurements.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(result.measurements[0].center.y < result.measurements[1].center.y);
    }

    #[test]
    fn roi_excludes_outside_detections_and_masks_outside() {
        let mut pipeline = ready_pipeline();
        pipeline.update_roi(roi(0, 0, 320, 480));
        let frame = with_blob(with_blob(belt(), (100, 240), 25), (500, 240), 25);

        let result = pipeline.process_frame(&frame);
        assert_eq!(result.dough_count, 1);
        assert!(result.centers[0].x < 320.0);
        assert_eq!(pipeline.segmented_mask().get_pixel(500, 240).0[0], 0);
        assert_eq!(pipeline.segmented_mask().get_pixel(100, 240).0[0], 255);
        assert_eq!(pipeline.hsv_frame().dimensions(), (640, 480));
    }

    #[test]
    fn roi_outside_frame_clears_everything() {
        let mut pipeline = ready_pipeline();
        pipeline.update_roi(roi(700, 500, 100, 100));
        let result = pipeline.process_frame(&with_blob(belt(), (320, 240), 25));
        assert_eq!(result.dough_count, 0);
        assert!(pipeline.segmented_mask().pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn zero_sized_roi_disables_filtering() {
        let mut pipeline = ready_pipeline();
        pipeline.update_roi(roi(0, 0, 0, 0));
        let frame = Frame::from_pixel(1000, 600, BELT_BGR);
        let result = pipeline.process_frame(&with_blob(frame, (900, 500), 25));
        assert_eq!(result.dough_count, 1);
    }

    #[test]
    fn restrict_to_roi_keeps_boundary_pixels() {
        let mut mask = GrayImage::from_pixel(10, 8, Luma([255]));
        restrict_to_roi(&mut mask, &roi(2, 3, 4, 2));
        let kept: Vec<(u32, u32)> = mask
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == 255)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(kept.len(), 8);
        assert!(kept.contains(&(2, 3)));
        assert!(kept.contains(&(5, 4)));
        assert!(!kept.contains(&(6, 4)));
    }

    #[test]
    fn restrict_to_roi_clamps_partial_overlap() {
        let mut mask = GrayImage::from_pixel(640, 480, Luma([255]));
        restrict_to_roi(&mut mask, &roi(600, 400, 100, 100));
        let kept: Vec<(u32, u32)> = mask
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == 255)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(kept.len(), 40 * 80);
        assert!(kept.iter().all(|&(x, y)| x >= 600 && y >= 400));
        assert!(kept.contains(&(639, 479)));
    }

    #[test]
    fn rejected_frame_clears_diagnostics() {
        let mut pipeline = ready_pipeline();
        pipeline.process_frame(&with_blob(belt(), (320, 240), 25));
        assert_eq!(pipeline.segmented_mask().dimensions(), (640, 480));
        assert_eq!(pipeline.hsv_frame().dimensions(), (640, 480));

        let result = pipeline.process_frame(&Frame::new(0, 0));
        assert!(!result.is_valid);
        assert_eq!(pipeline.segmented_mask().dimensions(), (0, 0));
        assert_eq!(pipeline.hsv_frame().dimensions(), (0, 0));
    }

    #[test]
    fn performance_window_tracks_frames() {
        let mut pipeline = ready_pipeline();
        let frame = with_blob(belt(), (320, 240), 25);
        for _ in 0..3 {
            pipeline.process_frame(&frame);
        }
        let stats = pipeline.performance_stats();
        assert_eq!(stats.frame_count, 3);
        assert!(stats.min_total_ms <= stats.avg_total_ms);
        assert!(stats.avg_total_ms <= stats.max_total_ms);

        pipeline.reset_performance_stats();
        assert_eq!(pipeline.performance_stats().frame_count, 0);
    }

    #[test]
    fn result_timings_are_consistent() {
        let mut pipeline = ready_pipeline();
        let result = pipeline.process_frame(&with_blob(belt(), (320, 240), 25));
        assert!(result.segmentation_time_ms >= 0.0);
        assert!(
            result.total_time_ms
                >= result.segmentation_time_ms + result.contour_time_ms + result.rule_time_ms - 1e-6
        );
    }

    #[test]
    fn scalar_and_detected_kernels_agree() {
        let frame = with_blob(with_blob(belt(), (200, 200), 30), (420, 260), 22);
        let mut scalar = VisionPipeline::with_converter(HsvConverter::scalar());
        scalar.initialize_with(PipelineConfig::default());
        let mut detected = ready_pipeline();

        let a = scalar.process_frame(&frame);
        let b = detected.process_frame(&frame);
        assert_eq!(a.measurements, b.measurements);
        assert_eq!(scalar.segmented_mask(), detected.segmented_mask());
    }

    #[test]
    fn invalid_config_falls_back_to_defaults() {
        let mut pipeline = VisionPipeline::new();
        let config = PipelineConfig {
            color_range: ColorRange::new([60, 0, 0], [10, 255, 255]),
            ..PipelineConfig::default()
        };
        assert!(pipeline.initialize_with(config));
        assert_eq!(pipeline.color_range(), ColorRange::default());
    }
}
