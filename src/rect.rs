use image::math::Rect;
use imageproc::point::Point;
use num_traits::{Num, ToPrimitive};

/// Calculates the pixel-inclusive axis-aligned bounding box of a point set.
///
/// Contour points sit on pixel centers, so a contour spanning columns `x0..=x1`
/// covers `x1 - x0 + 1` pixels. The returned rectangle uses that convention:
/// a single point yields a 1x1 box.
///
/// Coordinates are generic over numeric types that implement `PartialOrd`,
/// making the function usable with both integer and floating-point points.
/// Negative coordinates are clamped to 0.
///
/// # Returns
///
/// `None` if `points` is empty.
///
/// # Examples
///
/// ```
/// use imageproc::point::Point;
/// use dough_inspect::rect::bounding_rect;
///
/// let outline = [
///     Point { x: 50, y: 10 },
///     Point { x: 90, y: 50 },
///     Point { x: 50, y: 90 },
///     Point { x: 10, y: 50 },
/// ];
///
/// let bounding_box = bounding_rect(&outline).unwrap();
///
/// assert_eq!(bounding_box.x, 10);
/// assert_eq!(bounding_box.y, 10);
/// assert_eq!(bounding_box.width, 81);
/// assert_eq!(bounding_box.height, 81);
/// ```
pub fn bounding_rect<T>(points: &[Point<T>]) -> Option<Rect>
where
    T: Copy + PartialOrd + Num + ToPrimitive,
{
    let (first, rest) = points.split_first()?;
    let mut min_x = first.x;
    let mut max_x = first.x;
    let mut min_y = first.y;
    let mut max_y = first.y;

    // Manual comparison is used here because `T` only has a `PartialOrd`.
    for p in rest {
        if p.x < min_x {
            min_x = p.x;
        }
        if p.x > max_x {
            max_x = p.x;
        }
        if p.y < min_y {
            min_y = p.y;
        }
        if p.y > max_y {
            max_y = p.y;
        }
    }

    let x = min_x.to_u32().unwrap_or(0);
    let y = min_y.to_u32().unwrap_or(0);

    let width = max_x.to_u32().unwrap_or(0).saturating_sub(x) + 1;
    let height = max_y.to_u32().unwrap_or(0).saturating_sub(y) + 1;

    Some(Rect {
        x,
        y,
        width,
        height,
    })
}

/// True if the rectangle has a non-zero width and height.
pub fn is_active(rect: &Rect) -> bool {
    rect.width > 0 && rect.height > 0
}

/// Intersection of two rectangles. Disjoint rectangles give a zero-sized one.
pub fn intersect(a: &Rect, b: &Rect) -> Rect {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = (a.x as u64 + a.width as u64).min(b.x as u64 + b.width as u64);
    let y1 = (a.y as u64 + a.height as u64).min(b.y as u64 + b.height as u64);

    if x1 <= x0 as u64 || y1 <= y0 as u64 {
        return Rect {
            x: x0,
            y: y0,
            width: 0,
            height: 0,
        };
    }

    Rect {
        x: x0,
        y: y0,
        width: (x1 - x0 as u64) as u32,
        height: (y1 - y0 as u64) as u32,
    }
}

/// Clips `rect` to a `width` x `height` image.
pub fn clamp_to(rect: &Rect, width: u32, height: u32) -> Rect {
    intersect(
        rect,
        &Rect {
            x: 0,
            y: 0,
            width,
            height,
        },
    )
}

/// Inclusive containment: points on any edge of `rect` count as inside.
pub fn contains_point(rect: &Rect, point: Point<f32>) -> bool {
    let (x0, y0) = (rect.x as f64, rect.y as f64);
    let x1 = x0 + rect.width as f64;
    let y1 = y0 + rect.height as f64;
    let (px, py) = (point.x as f64, point.y as f64);
    px >= x0 && px <= x1 && py >= y0 && py <= y1
}
