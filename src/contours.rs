use image::{GrayImage, math::Rect};
use imageproc::{
    contours::{BorderType, Contour},
    point::Point,
};
use num_traits::AsPrimitive;

use crate::rect::bounding_rect;

/// Shape descriptors of one traced region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourFeatures {
    /// Polygon area enclosed by the contour, in px².
    pub area: f64,
    /// Closed arc length of the contour, in px.
    pub perimeter: f64,
    /// Pixel-inclusive axis-aligned bounding box.
    pub bounding_box: Rect,
    /// Polygon centroid.
    pub center: Point<f32>,
    /// `bounding_box.width / bounding_box.height`.
    pub aspect_ratio: f64,
    /// `4π·area / perimeter²`, clamped to `[0, 1]`.
    pub circularity: f64,
}

/// Traces the outer border of every top-level foreground region in `mask`.
///
/// Any non-zero pixel counts as foreground. Holes, and regions nested inside
/// holes, are not reported. Contours come back in the tracer's raster-scan order
/// with the tracer's boundary-following point order, so the same mask always
/// produces the same list.
pub fn find_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    imageproc::contours::find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .collect()
}

/// Computes [`ContourFeatures`] for each contour, in the same order.
pub fn extract_features(contours: &[Contour<i32>]) -> Vec<ContourFeatures> {
    contours
        .iter()
        .map(|contour| features_of(&contour.points))
        .collect()
}

/// Computes the shape descriptors of a closed polygon.
///
/// Fewer than three points cannot enclose an area; such contours get zero area
/// and zero circularity but still report a bounding box and center.
pub fn features_of<T>(points: &[Point<T>]) -> ContourFeatures
where
    T: Copy + PartialOrd + num_traits::Num + num_traits::ToPrimitive + AsPrimitive<f64>,
{
    let bounding_box = bounding_rect(points).unwrap_or(Rect {
        x: 0,
        y: 0,
        width: 0,
        height: 0,
    });
    let aspect_ratio = if bounding_box.height > 0 {
        bounding_box.width as f64 / bounding_box.height as f64
    } else {
        0.0
    };
    let perimeter = closed_perimeter(points);

    let (signed_area, centroid) = if points.len() >= 3 {
        polygon_moments(points)
    } else {
        (0.0, None)
    };
    let area = signed_area.abs();

    let center = centroid.unwrap_or_else(|| mean_point(points));

    let circularity = if perimeter > 0.0 {
        (4.0 * std::f64::consts::PI * area / (perimeter * perimeter)).clamp(0.0, 1.0)
    } else {
        0.0
    };

    ContourFeatures {
        area,
        perimeter,
        bounding_box,
        center,
        aspect_ratio,
        circularity,
    }
}

/// Sum of Euclidean distances between consecutive points, closing the loop by
/// including the distance between the last and first point.
///
/// Contours with 0 or 1 point have a perimeter of `0.0`; a two-point contour
/// counts its segment twice.
pub fn closed_perimeter<T>(points: &[Point<T>]) -> f64
where
    T: Copy + AsPrimitive<f64>,
{
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p1, p2)| {
            let dx: f64 = p2.x.as_() - p1.x.as_();
            let dy: f64 = p2.y.as_() - p1.y.as_();
            dx.hypot(dy)
        })
        .sum()
}

/// Signed shoelace area and centroid. The centroid is `None` for zero area.
fn polygon_moments<T>(points: &[Point<T>]) -> (f64, Option<Point<f32>>)
where
    T: Copy + AsPrimitive<f64>,
{
    let mut twice_area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;

    for (p1, p2) in points.iter().zip(points.iter().cycle().skip(1)) {
        let (x1, y1): (f64, f64) = (p1.x.as_(), p1.y.as_());
        let (x2, y2): (f64, f64) = (p2.x.as_(), p2.y.as_());
        let cross = x1 * y2 - x2 * y1;
        twice_area += cross;
        cx += (x1 + x2) * cross;
        cy += (y1 + y2) * cross;
    }

    let area = twice_area / 2.0;
    if area.abs() < f64::EPSILON {
        return (0.0, None);
    }
    let centroid = Point::new((cx / (6.0 * area)) as f32, (cy / (6.0 * area)) as f32);
    (area, Some(centroid))
}

fn mean_point<T>(points: &[Point<T>]) -> Point<f32>
where
    T: Copy + AsPrimitive<f64>,
{
    if points.is_empty() {
        return Point::new(0.0, 0.0);
    }
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| {
        let (x, y): (f64, f64) = (p.x.as_(), p.y.as_());
        (sx + x, sy + y)
    });
    Point::new((sx / n) as f32, (sy / n) as f32)
}
