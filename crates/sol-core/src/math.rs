//! Geometry kernel: 2D vectors, rays and the intersection tests used by
//! visibility, collision and projectile resolution.
//!
//! Every function is total. Degenerate input (zero-length directions,
//! polygons with fewer than three vertices, parallel edges) yields `None`,
//! `false` or an explicit fallback value rather than a panic or NaN.
//!
//! Trigonometry goes through `libm`, never the platform math library, so
//! rotations and angles are bit-identical on every peer. `sqrt` is
//! correctly rounded under IEEE 754 and stays on `f32`.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Tolerance used to reject grazing or self intersections.
pub const EPSILON: f32 = 1e-5;

// ---------------------------------------------------------------------------
// Vec2
// ---------------------------------------------------------------------------

/// 2D vector in world units (pixels).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const X: Vec2 = Vec2 { x: 1.0, y: 0.0 };
    pub const Y: Vec2 = Vec2 { x: 0.0, y: 1.0 };

    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn from_angle(angle: f32) -> Self {
        let (sin, cos) = libm::sincosf(angle);
        Self { x: cos, y: sin }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    #[inline]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    #[inline]
    pub fn distance(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    #[inline]
    pub fn distance_sq(&self, other: Vec2) -> f32 {
        (*self - other).length_sq()
    }

    /// Unit vector in the same direction, or `ZERO` for a zero vector.
    pub fn normalize(&self) -> Self {
        self.normalize_or(Self::ZERO)
    }

    /// Unit vector in the same direction, or `fallback` when the length is
    /// too small to divide by.
    pub fn normalize_or(&self, fallback: Vec2) -> Self {
        let len = self.length();
        if len > EPSILON {
            Self {
                x: self.x / len,
                y: self.y / len,
            }
        } else {
            fallback
        }
    }

    /// Returns the normalized vector and the original length.
    pub fn normalize_with_length(&self) -> (Self, f32) {
        let len = self.length();
        if len > EPSILON {
            (
                Self {
                    x: self.x / len,
                    y: self.y / len,
                },
                len,
            )
        } else {
            (Self::ZERO, len)
        }
    }

    #[inline]
    pub fn dot(&self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (z component of the 3D cross product).
    #[inline]
    pub fn cross(&self, other: Vec2) -> f32 {
        self.x * other.y - self.y * other.x
    }

    /// Perpendicular vector, rotated 90 degrees counter-clockwise.
    #[inline]
    pub fn perp(&self) -> Self {
        Self {
            x: -self.y,
            y: self.x,
        }
    }

    /// Angle in radians from the positive x axis.
    #[inline]
    pub fn angle(&self) -> f32 {
        libm::atan2f(self.y, self.x)
    }

    pub fn rotate(&self, angle: f32) -> Self {
        let (sin, cos) = libm::sincosf(angle);
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    /// Step toward `target` by at most `max_step`, never overshooting.
    pub fn move_toward(&self, target: Vec2, max_step: f32) -> Self {
        let (dir, dist) = (target - *self).normalize_with_length();
        if dist <= max_step || dist <= EPSILON {
            target
        } else {
            *self + dir * max_step
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl SubAssign for Vec2 {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    #[inline]
    fn mul(self, scalar: f32) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

impl MulAssign<f32> for Vec2 {
    #[inline]
    fn mul_assign(&mut self, scalar: f32) {
        self.x *= scalar;
        self.y *= scalar;
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;
    #[inline]
    fn div(self, scalar: f32) -> Self {
        Self::new(self.x / scalar, self.y / scalar)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

// ---------------------------------------------------------------------------
// Ray
// ---------------------------------------------------------------------------

/// A half-line. `direction` is expected to be normalized, in which case the
/// parameter returned by the intersection functions is a distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec2,
    pub direction: Vec2,
}

impl Ray {
    pub fn new(origin: Vec2, direction: Vec2) -> Self {
        Self { origin, direction }
    }

    /// Ray from `from` toward `to` plus the distance between them.
    /// Returns `None` when the points coincide.
    pub fn between(from: Vec2, to: Vec2) -> Option<(Self, f32)> {
        let (direction, dist) = (to - from).normalize_with_length();
        if dist <= EPSILON {
            return None;
        }
        Some((Self::new(from, direction), dist))
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec2 {
        self.origin + self.direction * t
    }
}

// ---------------------------------------------------------------------------
// Intersections
// ---------------------------------------------------------------------------

/// Parametric intersection of a ray with the segment `a`-`b`.
///
/// Returns the ray parameter of the hit when it is strictly positive and
/// lies on the segment. Parallel segments never intersect.
pub fn ray_segment_intersection(ray: &Ray, a: Vec2, b: Vec2) -> Option<f32> {
    let edge = b - a;
    let denom = ray.direction.cross(edge);
    if denom.abs() < EPSILON {
        return None;
    }
    let diff = a - ray.origin;
    let t = diff.cross(edge) / denom;
    let u = diff.cross(ray.direction) / denom;
    if t > EPSILON && (0.0..=1.0).contains(&u) {
        Some(t)
    } else {
        None
    }
}

/// Minimal positive ray parameter over every edge of a closed polygon.
pub fn ray_polygon_intersection(ray: &Ray, vertices: &[Vec2]) -> Option<f32> {
    if vertices.len() < 3 {
        return None;
    }
    let mut best: Option<f32> = None;
    for i in 0..vertices.len() {
        let a = vertices[i];
        let b = vertices[(i + 1) % vertices.len()];
        if let Some(t) = ray_segment_intersection(ray, a, b) {
            best = Some(best.map_or(t, |cur| cur.min(t)));
        }
    }
    best
}

/// First positive ray parameter at which the ray meets a circle. A ray that
/// starts inside the circle reports its exit point.
pub fn ray_circle_intersection(ray: &Ray, center: Vec2, radius: f32) -> Option<f32> {
    let a = ray.direction.length_sq();
    if a <= EPSILON {
        return None;
    }
    let m = ray.origin - center;
    let b = m.dot(ray.direction);
    let c = m.length_sq() - radius * radius;
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let s = disc.sqrt();
    let t0 = (-b - s) / a;
    let t1 = (-b + s) / a;
    if t0 > EPSILON {
        Some(t0)
    } else if t1 > EPSILON {
        Some(t1)
    } else {
        None
    }
}

/// Closest point to `p` on the segment `a`-`b`.
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_sq();
    if len_sq <= EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Whether the segment `a`-`b` passes within `radius` of `center`.
pub fn segment_circle_overlap(a: Vec2, b: Vec2, center: Vec2, radius: f32) -> bool {
    closest_point_on_segment(center, a, b).distance_sq(center) <= radius * radius
}

/// Crossing-number point-in-polygon test. Points exactly on an edge may go
/// either way; callers treat the boundary as outside.
pub fn point_in_polygon(point: Vec2, vertices: &[Vec2]) -> bool {
    if vertices.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let vi = vertices[i];
        let vj = vertices[j];
        if (vi.y > point.y) != (vj.y > point.y) {
            let x_cross = (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Whether the polygon is strictly convex (all turns in one direction, no
/// collinear or zero-length edges).
pub fn is_convex(vertices: &[Vec2]) -> bool {
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f32;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        let c = vertices[(i + 2) % n];
        let turn = (b - a).cross(c - b);
        if turn.abs() <= EPSILON {
            return false;
        }
        if sign == 0.0 {
            sign = turn.signum();
        } else if turn.signum() != sign {
            return false;
        }
    }
    true
}
