//! 2D geometry kernel for the plan frame.
//!
//! Coordinates are meters with the origin at the floorplan top-left,
//! +x right and +y down. Heading 0° points toward -y (plan "up") and
//! +90° points toward +x, so `bearing` uses `atan2(dx, -dy)`.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Point2 { x, y }
    }

    pub fn distance_to(&self, other: Point2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Wrap a heading into `[0, 360)`.
pub fn wrap_heading(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest angular difference `a - b`, normalized to `(-180, 180]`.
pub fn heading_diff(a: f64, b: f64) -> f64 {
    let mut diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        diff -= 360.0;
    }
    diff
}

/// Blend `next` into `prev` by `alpha`, moving along the shortest arc.
pub fn low_pass_heading(prev: f64, next: f64, alpha: f64) -> f64 {
    wrap_heading(prev + heading_diff(next, prev) * alpha)
}

/// Compass-style bearing of the segment `a -> b` in the plan frame,
/// wrapped to `[0, 360)`. North (0°) is -y.
pub fn bearing(a: Point2, b: Point2) -> f64 {
    wrap_heading((b.x - a.x).atan2(-(b.y - a.y)).to_degrees())
}

/// Projection of a point onto a segment.
#[derive(Clone, Copy, Debug)]
pub struct SegmentProjection {
    /// Fraction along the segment from `a` to `b`, clamped to `[0, 1]`.
    pub t: f64,
    /// Closest point on the segment.
    pub point: Point2,
    /// Distance from the query point to `point`.
    pub distance: f64,
}

/// Project `p` onto the segment `a -> b`. Zero-length segments (squared
/// length <= 1e-9) collapse to `a` with `t = 0`.
pub fn project_point_to_segment(p: Point2, a: Point2, b: Point2) -> SegmentProjection {
    let ab = Vector2::new(b.x - a.x, b.y - a.y);
    let ap = Vector2::new(p.x - a.x, p.y - a.y);

    let len_sq = ab.norm_squared();
    let t = if len_sq <= 1e-9 {
        0.0
    } else {
        (ap.dot(&ab) / len_sq).clamp(0.0, 1.0)
    };

    let point = Point2::new(a.x + ab.x * t, a.y + ab.y * t);
    SegmentProjection {
        t,
        point,
        distance: p.distance_to(point),
    }
}

/// Total Euclidean length of a polyline.
pub fn polyline_length(points: &[Point2]) -> f64 {
    points
        .windows(2)
        .map(|pair| pair[0].distance_to(pair[1]))
        .sum()
}
