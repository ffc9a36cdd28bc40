//! Rays, bounding boxes and the closest-point math used by culling and
//! hit resolution.

use glam::{Mat4, Vec3};

/// A half-line in world or object space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point (on the near clip plane for view rays).
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    /// Creates a ray; the direction is normalized.
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Point at parameter `t` along the ray.
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Transforms the ray by an affine matrix. The direction is left
    /// unnormalized so that parameters stay comparable across spaces.
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            origin: matrix.transform_point3(self.origin),
            direction: matrix.transform_vector3(self.direction),
        }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Bounding box of a point set, or `None` for an empty set.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self { min, max })
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns true if the box collapses to a single point.
    #[must_use]
    pub fn is_point(&self) -> bool {
        (self.max - self.min).max_element() <= f32::EPSILON
    }

    /// The eight corners.
    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box grown by `margin` on every side.
    #[must_use]
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    /// World-space box enclosing this box after transformation.
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = self.corners().map(|c| matrix.transform_point3(c));
        let (min, max) = corners[1..]
            .iter()
            .fold((corners[0], corners[0]), |(min, max), &p| (min.min(p), max.max(p)));
        Self { min, max }
    }

    /// Slab test against a ray restricted to `t >= 0`.
    ///
    /// Returns the entry and exit parameters when the ray hits the box.
    #[must_use]
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(f32, f32)> {
        let mut t_min = 0.0_f32;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            if dir.abs() < 1e-12 {
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let mut t0 = (self.min[axis] - origin) * inv;
            let mut t1 = (self.max[axis] - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some((t_min, t_max))
    }
}

/// Intersects a ray with the infinite plane through `point` with `normal`.
///
/// The ray parameter may be negative; only a ray parallel to the plane
/// yields `None`.
#[must_use]
pub fn ray_plane_intersect(ray: &Ray, point: Vec3, normal: Vec3) -> Option<Vec3> {
    let denom = normal.dot(ray.direction);
    if denom.abs() < 1e-8 {
        return None;
    }
    let t = (point - ray.origin).dot(normal) / denom;
    Some(ray.at(t))
}

/// Fraction along segment `a -> b` of the point closest to the ray's line.
///
/// The result is not clamped; callers decide how to treat values outside
/// `[0, 1]`. A degenerate segment yields `0.0`, a segment parallel to the
/// ray yields the fraction of the point closest to the ray origin.
#[must_use]
pub fn ray_segment_fraction(ray: &Ray, a: Vec3, b: Vec3) -> f32 {
    let v = b - a;
    let c = v.dot(v);
    if c < 1e-12 {
        return 0.0;
    }

    let w0 = ray.origin - a;
    let a_dot = ray.direction.dot(ray.direction);
    let b_dot = ray.direction.dot(v);
    let d = ray.direction.dot(w0);
    let e = v.dot(w0);
    let denom = a_dot * c - b_dot * b_dot;

    if denom.abs() < 1e-8 * a_dot * c {
        return e / c;
    }
    (a_dot * e - b_dot * d) / denom
}

/// Unit normal of a triangle, or zero for a degenerate one.
#[must_use]
pub fn triangle_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (b - a).cross(c - a).normalize_or_zero()
}

/// Smallest axis scale of an affine matrix.
#[must_use]
pub fn min_axis_scale(matrix: &Mat4) -> f32 {
    matrix
        .x_axis
        .truncate()
        .length()
        .min(matrix.y_axis.truncate().length())
        .min(matrix.z_axis.truncate().length())
}
