//! Diagnostic overlay drawn onto a camera frame.

use image::{Rgb, math::Rect};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::point::Point;
use imageproc::rect::Rect as DrawRect;

use crate::colors::{FAULT_COLOR, ROI_COLOR, generate_contrasting_colors};
use crate::hsv::Frame;
use crate::rect;
use crate::result::DetectionResult;

const CENTER_RADIUS: i32 = 4;

fn to_draw_rect(rect: &Rect) -> DrawRect {
    DrawRect::at(rect.x as i32, rect.y as i32).of_size(rect.width, rect.height)
}

/// Draws the ROI outline and, for every detection, its bounding box, contour
/// and center.
///
/// Passing detections get distinct colors; failing ones are drawn in red. With
/// an active ROI, boxes are clipped to it and contour segments or centers
/// outside it are skipped.
pub fn render_detections(frame: &mut Frame, result: &DetectionResult, roi: Option<Rect>) {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let roi = roi.map(|roi| rect::clamp_to(&roi, width, height)).filter(rect::is_active);
    if let Some(roi) = roi {
        draw_hollow_rect_mut(frame, to_draw_rect(&roi), ROI_COLOR);
    }

    let palette = generate_contrasting_colors(result.measurements.len());
    let inside = |p: Point<f32>| roi.is_none_or(|roi| rect::contains_point(&roi, p));

    for (i, measurement) in result.measurements.iter().enumerate() {
        let color: Rgb<u8> = if measurement.meets_specs {
            palette[i]
        } else {
            FAULT_COLOR
        };

        let bbox = match roi {
            Some(roi) => rect::intersect(&measurement.bbox, &roi),
            None => rect::clamp_to(&measurement.bbox, width, height),
        };
        if rect::is_active(&bbox) {
            draw_hollow_rect_mut(frame, to_draw_rect(&bbox), color);
        }

        if let Some(contour) = result.contours.get(i) {
            let points: Vec<Point<f32>> = contour
                .points
                .iter()
                .map(|p| Point::new(p.x as f32, p.y as f32))
                .collect();
            for (start, end) in points.iter().zip(points.iter().cycle().skip(1)) {
                if inside(*start) && inside(*end) {
                    draw_line_segment_mut(frame, (start.x, start.y), (end.x, end.y), color);
                }
            }
        }

        if inside(measurement.center) {
            let center = (
                measurement.center.x.round() as i32,
                measurement.center.y.round() as i32,
            );
            draw_filled_circle_mut(frame, center, CENTER_RADIUS, color);
        }
    }
}
