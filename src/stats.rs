//! Rolling per-frame timing statistics.

use std::collections::VecDeque;

/// Number of most recent frames the statistics cover.
pub const DEFAULT_WINDOW: usize = 100;

/// Stage durations of one processed frame, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTiming {
    pub segmentation_ms: f64,
    pub contour_ms: f64,
    pub rule_ms: f64,
    pub total_ms: f64,
}

/// Summary over the current window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceStats {
    pub avg_total_ms: f64,
    pub avg_segmentation_ms: f64,
    pub avg_contour_ms: f64,
    pub avg_rule_ms: f64,
    pub min_total_ms: f64,
    pub max_total_ms: f64,
    pub frame_count: usize,
}

/// Fixed-capacity FIFO of frame timings. Once full, each new sample evicts the
/// oldest one.
#[derive(Debug, Clone)]
pub struct PerformanceWindow {
    samples: VecDeque<FrameTiming>,
    capacity: usize,
}

impl Default for PerformanceWindow {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_WINDOW)
    }
}

impl PerformanceWindow {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "performance window capacity must be positive");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, timing: FrameTiming) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(timing);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Averages and total-time extremes. All zero when the window is empty.
    pub fn stats(&self) -> PerformanceStats {
        if self.samples.is_empty() {
            return PerformanceStats::default();
        }

        let n = self.samples.len() as f64;
        let mut sum = FrameTiming::default();
        let mut min_total = f64::INFINITY;
        let mut max_total = f64::NEG_INFINITY;
        for sample in &self.samples {
            sum.total_ms += sample.total_ms;
            sum.segmentation_ms += sample.segmentation_ms;
            sum.contour_ms += sample.contour_ms;
            sum.rule_ms += sample.rule_ms;
            min_total = min_total.min(sample.total_ms);
            max_total = max_total.max(sample.total_ms);
        }

        PerformanceStats {
            avg_total_ms: sum.total_ms / n,
            avg_segmentation_ms: sum.segmentation_ms / n,
            avg_contour_ms: sum.contour_ms / n,
            avg_rule_ms: sum.rule_ms / n,
            min_total_ms: min_total,
            max_total_ms: max_total,
            frame_count: self.samples.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(total_ms: f64) -> FrameTiming {
        FrameTiming {
            segmentation_ms: total_ms / 2.0,
            contour_ms: total_ms / 4.0,
            rule_ms: total_ms / 8.0,
            total_ms,
        }
    }

    #[test]
    fn empty_window_reports_zeros() {
        assert_eq!(PerformanceWindow::default().stats(), PerformanceStats::default());
    }

    #[test]
    fn averages_and_extremes() {
        let mut window = PerformanceWindow::default();
        for total in [2.0, 4.0, 6.0] {
            window.record(timing(total));
        }
        let stats = window.stats();
        assert_eq!(stats.frame_count, 3);
        assert_eq!(stats.avg_total_ms, 4.0);
        assert_eq!(stats.avg_segmentation_ms, 2.0);
        assert_eq!(stats.avg_contour_ms, 1.0);
        assert_eq!(stats.avg_rule_ms, 0.5);
        assert_eq!(stats.min_total_ms, 2.0);
        assert_eq!(stats.max_total_ms, 6.0);
    }

    #[test]
    fn oldest_sample_is_evicted() {
        let mut window = PerformanceWindow::with_capacity(DEFAULT_WINDOW);
        window.record(timing(1000.0));
        for _ in 0..DEFAULT_WINDOW {
            window.record(timing(1.0));
        }
        let stats = window.stats();
        assert_eq!(stats.frame_count, DEFAULT_WINDOW);
        assert_eq!(stats.max_total_ms, 1.0);

        window.clear();
        assert!(window.is_empty());
    }
}
