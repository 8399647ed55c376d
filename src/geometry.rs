//! 2D geometry primitives in map-pixel space.
//!
//! Everything here is pure and allocation-free. Degenerate inputs
//! (parallel lines, zero-length segments) report "no intersection"
//! instead of producing NaN or infinities.

use serde::{Deserialize, Serialize};

/// Denominators below this (relative to segment length) count as parallel.
const PARALLEL_EPS: f64 = 1e-12;

/// Slack on the segment parameter so rays aimed exactly at an endpoint
/// still register the hit despite rounding.
const ENDPOINT_SLACK: f64 = 1e-9;

/// Squared lengths at or below this are treated as zero.
pub const DEGENERATE_LEN_SQ: f64 = 1e-18;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_squared(self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub a: Point,
    pub b: Point,
}

impl Segment {
    pub const fn new(a: Point, b: Point) -> Self {
        Self { a, b }
    }

    pub fn length_squared(&self) -> f64 {
        self.a.distance_squared(self.b)
    }

    pub fn is_degenerate(&self) -> bool {
        self.length_squared() <= DEGENERATE_LEN_SQ
    }
}

/// Angle of `p` as seen from `origin`, in `(-π, π]`.
#[inline]
pub fn angle_from(origin: Point, p: Point) -> f64 {
    (p.y - origin.y).atan2(p.x - origin.x)
}

/// Wrap an angle into `(-π, π]`.
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    let mut a = angle;
    while a > PI {
        a -= TAU;
    }
    while a <= -PI {
        a += TAU;
    }
    a
}

/// Distance along the unit ray `(ox, oy) + t * (dx, dy)` to the segment,
/// or `None` if the ray is parallel, misses, or the hit is behind the origin.
#[inline]
pub fn ray_segment_intersection(origin: Point, dx: f64, dy: f64, seg: &Segment) -> Option<f64> {
    let sx = seg.b.x - seg.a.x;
    let sy = seg.b.y - seg.a.y;
    let denom = dx * sy - dy * sx;
    if denom.abs() <= PARALLEL_EPS * (sx.abs() + sy.abs()) {
        return None;
    }
    let d_x1 = seg.a.x - origin.x;
    let d_y1 = seg.a.y - origin.y;
    let t = (d_x1 * sy - d_y1 * sx) / denom;
    if t < 0.0 {
        return None;
    }
    let u = (d_x1 * dy - d_y1 * dx) / denom;
    if (-ENDPOINT_SLACK..=1.0 + ENDPOINT_SLACK).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Intersection of two segments.
///
/// Returns the hit point and the parameter along `p` (0 at `p.a`, 1 at
/// `p.b`), or `None` when the segments are parallel, degenerate or do
/// not overlap within their bounds.
pub fn segment_intersection(p: &Segment, q: &Segment) -> Option<(Point, f64)> {
    let rx = p.b.x - p.a.x;
    let ry = p.b.y - p.a.y;
    let sx = q.b.x - q.a.x;
    let sy = q.b.y - q.a.y;
    let denom = rx * sy - ry * sx;
    let scale = (rx.abs() + ry.abs()) * (sx.abs() + sy.abs());
    if scale <= 0.0 || denom.abs() <= PARALLEL_EPS * scale {
        return None;
    }
    let qpx = q.a.x - p.a.x;
    let qpy = q.a.y - p.a.y;
    let t = (qpx * sy - qpy * sx) / denom;
    let u = (qpx * ry - qpy * rx) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some((Point::new(p.a.x + t * rx, p.a.y + t * ry), t))
    } else {
        None
    }
}

/// Smallest parameter `t` in `[0, 1]` where the segment meets the circle
/// boundary, or `None` if it never does. Used to clip walls to the
/// vision circle before bucketing them.
pub fn circle_segment_intersection(center: Point, radius: f64, seg: &Segment) -> Option<f64> {
    let dx = seg.b.x - seg.a.x;
    let dy = seg.b.y - seg.a.y;
    let a = dx * dx + dy * dy;
    if a <= DEGENERATE_LEN_SQ {
        return None;
    }
    let fx = seg.a.x - center.x;
    let fy = seg.a.y - center.y;
    let b = 2.0 * (fx * dx + fy * dy);
    let c = fx * fx + fy * fy - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let root = disc.sqrt();
    let t1 = (-b - root) / (2.0 * a);
    let t2 = (-b + root) / (2.0 * a);
    [t1, t2].into_iter().find(|t| (0.0..=1.0).contains(t))
}

/// Squared distance from `p` to the closest point of `seg`.
pub fn point_to_segment_distance_squared(p: Point, seg: &Segment) -> f64 {
    let dx = seg.b.x - seg.a.x;
    let dy = seg.b.y - seg.a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= DEGENERATE_LEN_SQ {
        return p.distance_squared(seg.a);
    }
    let t = (((p.x - seg.a.x) * dx + (p.y - seg.a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance_squared(Point::new(seg.a.x + t * dx, seg.a.y + t * dy))
}

/// Even-odd ray-casting point-in-polygon test.
pub fn point_in_polygon(p: Point, vertices: &[Point]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = vertices[i];
        let vj = vertices[j];
        if (vi.y > p.y) != (vj.y > p.y) {
            let intersect_x = (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x;
            if p.x < intersect_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Shoelace area; positive regardless of winding order.
pub fn polygon_area(vertices: &[Point]) -> f64 {
    let n = vertices.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += vertices[i].x * vertices[j].y;
        area -= vertices[j].x * vertices[i].y;
    }
    area.abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn seg(x1: f64, y1: f64, x2: f64, y2: f64) -> Segment {
        Segment::new(Point::new(x1, y1), Point::new(x2, y2))
    }

    #[test]
    fn ray_hits_segment() {
        let t = ray_segment_intersection(Point::new(0.0, 0.0), 1.0, 0.0, &seg(5.0, -5.0, 5.0, 5.0));
        assert!((t.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn ray_misses_segment_behind() {
        let t = ray_segment_intersection(Point::new(0.0, 0.0), 1.0, 0.0, &seg(-5.0, -5.0, -5.0, 5.0));
        assert!(t.is_none());
    }

    #[test]
    fn ray_parallel_to_segment() {
        let t = ray_segment_intersection(Point::new(0.0, 0.0), 1.0, 0.0, &seg(1.0, 1.0, 9.0, 1.0));
        assert!(t.is_none());
    }

    #[test]
    fn ray_at_exact_endpoint_hits() {
        let t = ray_segment_intersection(
            Point::new(0.0, 0.0),
            std::f64::consts::FRAC_1_SQRT_2,
            std::f64::consts::FRAC_1_SQRT_2,
            &seg(10.0, 10.0, 10.0, 20.0),
        );
        assert!((t.unwrap() - 200f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn crossing_segments_intersect() {
        let (p, t) = segment_intersection(&seg(0.0, 0.0, 10.0, 10.0), &seg(0.0, 10.0, 10.0, 0.0)).unwrap();
        assert!((p.x - 5.0).abs() < 1e-9 && (p.y - 5.0).abs() < 1e-9);
        assert!((t - 0.5).abs() < 1e-9);
    }

    #[test]
    fn disjoint_and_degenerate_segments_do_not_intersect() {
        assert!(segment_intersection(&seg(0.0, 0.0, 1.0, 0.0), &seg(2.0, -1.0, 2.0, 1.0)).is_none());
        assert!(segment_intersection(&seg(0.0, 0.0, 1.0, 0.0), &seg(0.0, 1.0, 1.0, 1.0)).is_none());
        assert!(segment_intersection(&seg(0.0, 0.0, 0.0, 0.0), &seg(-1.0, 0.0, 1.0, 0.0)).is_none());
    }

    #[test]
    fn circle_clips_segment() {
        let t = circle_segment_intersection(Point::new(0.0, 0.0), 5.0, &seg(0.0, 0.0, 10.0, 0.0)).unwrap();
        assert!((t - 0.5).abs() < 1e-9);
        assert!(circle_segment_intersection(Point::new(0.0, 0.0), 5.0, &seg(6.0, 6.0, 9.0, 9.0)).is_none());
    }

    #[test]
    fn angles() {
        let o = Point::new(1.0, 1.0);
        assert!((angle_from(o, Point::new(1.0, 3.0)) - FRAC_PI_2).abs() < 1e-12);
        assert!((normalize_angle(PI + 0.5) - (-PI + 0.5)).abs() < 1e-12);
        assert!((normalize_angle(-PI) - PI).abs() < 1e-12);
    }

    #[test]
    fn point_segment_distance() {
        let s = seg(0.0, 0.0, 10.0, 0.0);
        assert!((point_to_segment_distance_squared(Point::new(5.0, 3.0), &s) - 9.0).abs() < 1e-12);
        assert!((point_to_segment_distance_squared(Point::new(13.0, 4.0), &s) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn polygon_area_unit_square() {
        let verts = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!((polygon_area(&verts) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn point_inside_polygon() {
        let sq = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(point_in_polygon(Point::new(5.0, 5.0), &sq));
        assert!(!point_in_polygon(Point::new(15.0, 5.0), &sq));
        assert!(!point_in_polygon(Point::new(5.0, 5.0), &sq[..2]));
    }
}
