//! The viewport a snap query runs against.
//!
//! Screen coordinates are in pixels with the origin at the top-left corner
//! of the viewport. Normalized device depth follows the `[0, 1]` convention
//! of `glam`'s `*_rh` projection helpers.

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

use crate::geometry::Ray;

/// Maximum number of world-space clip planes honored by a snap pass.
pub const MAX_CLIP_PLANES: usize = 6;

/// Camera and viewport state consumed by the picker.
pub trait Viewport {
    /// World-to-view transform.
    fn view_matrix(&self) -> Mat4;

    /// View-to-clip transform.
    fn projection_matrix(&self) -> Mat4;

    /// Viewport size in pixels.
    fn size(&self) -> UVec2;

    /// Near and far clip distances.
    fn clip_range(&self) -> (f32, f32);

    /// World-space clip planes `(n, d)`; points with `dot(n, p) + d < 0`
    /// are clipped away.
    fn clip_planes(&self) -> &[Vec4] {
        &[]
    }

    /// Combined view-projection matrix.
    fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Casts a world-space ray through a screen point, starting on the near
    /// plane.
    fn ray_from_point(&self, point: Vec2) -> Option<Ray> {
        let size = self.size();
        if size.x == 0 || size.y == 0 {
            return None;
        }

        let ndc = screen_to_ndc(point, size);
        let inv_view_proj = self.view_projection().inverse();

        let near = inv_view_proj * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
        let far = inv_view_proj * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        if near.w.abs() < 1e-12 || far.w.abs() < 1e-12 {
            return None;
        }

        let origin = near.truncate() / near.w;
        let direction = (far.truncate() / far.w - origin).normalize_or_zero();
        if direction.length_squared() < 1e-12 {
            return None;
        }
        Some(Ray { origin, direction })
    }

    /// Projects a world point to `(x, y)` pixels and NDC depth.
    ///
    /// Returns `None` for points at or behind the eye.
    fn project_to_screen(&self, world: Vec3) -> Option<Vec3> {
        let clip = self.view_projection() * world.extend(1.0);
        if clip.w <= 1e-12 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let screen = ndc_to_screen(Vec2::new(ndc.x, ndc.y), self.size());
        Some(screen.extend(ndc.z))
    }

    /// World-space length of one pixel at the depth of `world`.
    fn world_per_pixel_at(&self, world: Vec3) -> Option<f32> {
        let clip = self.view_projection() * world.extend(1.0);
        if clip.w <= 1e-12 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let size = self.size();
        if size.x == 0 {
            return None;
        }
        let step = 2.0 / size.x as f32;
        let inv_view_proj = self.view_projection().inverse();
        let a = inv_view_proj.project_point3(ndc);
        let b = inv_view_proj.project_point3(ndc + Vec3::new(step, 0.0, 0.0));
        Some(a.distance(b))
    }

    /// Returns true if `world` is clipped away by a clip plane.
    fn is_clipped(&self, world: Vec3) -> bool {
        self.clip_planes()
            .iter()
            .any(|plane| plane.truncate().dot(world) + plane.w < 0.0)
    }
}

/// Converts screen pixels to NDC `x, y`.
#[must_use]
pub fn screen_to_ndc(point: Vec2, size: UVec2) -> Vec2 {
    let half = size.as_vec2() * 0.5;
    Vec2::new(point.x / half.x - 1.0, 1.0 - point.y / half.y)
}

/// Converts NDC `x, y` to screen pixels.
#[must_use]
pub fn ndc_to_screen(ndc: Vec2, size: UVec2) -> Vec2 {
    let half = size.as_vec2() * 0.5;
    Vec2::new((ndc.x + 1.0) * half.x, (1.0 - ndc.y) * half.y)
}

/// A plain viewport description.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub view: Mat4,
    pub projection: Mat4,
    pub size: UVec2,
    pub near: f32,
    pub far: f32,
    pub clip_planes: Vec<Vec4>,
}

impl ViewState {
    /// Perspective view looking from `eye` at `target` with a vertical
    /// field of view in radians.
    #[must_use]
    pub fn perspective(eye: Vec3, target: Vec3, fov_y: f32, size: UVec2) -> Self {
        let (near, far) = (0.1, 100.0);
        let aspect = size.x.max(1) as f32 / size.y.max(1) as f32;
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
            size,
            near,
            far,
            clip_planes: Vec::new(),
        }
    }

    /// Orthographic view looking from `eye` at `target`, `half_height`
    /// world units from the center to the top edge.
    #[must_use]
    pub fn orthographic(eye: Vec3, target: Vec3, half_height: f32, size: UVec2) -> Self {
        let (near, far) = (0.1, 100.0);
        let aspect = size.x.max(1) as f32 / size.y.max(1) as f32;
        let half_width = half_height * aspect;
        Self {
            view: Mat4::look_at_rh(eye, target, Vec3::Y),
            projection: Mat4::orthographic_rh(
                -half_width,
                half_width,
                -half_height,
                half_height,
                near,
                far,
            ),
            size,
            near,
            far,
            clip_planes: Vec::new(),
        }
    }

    /// Adds a world clip plane; planes beyond [`MAX_CLIP_PLANES`] are
    /// ignored with a warning.
    #[must_use]
    pub fn with_clip_plane(mut self, plane: Vec4) -> Self {
        if self.clip_planes.len() < MAX_CLIP_PLANES {
            self.clip_planes.push(plane);
        } else {
            log::warn!("ignoring clip plane beyond the first {MAX_CLIP_PLANES}");
        }
        self
    }
}

impl Viewport for ViewState {
    fn view_matrix(&self) -> Mat4 {
        self.view
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    fn size(&self) -> UVec2 {
        self.size
    }

    fn clip_range(&self) -> (f32, f32) {
        (self.near, self.far)
    }

    fn clip_planes(&self) -> &[Vec4] {
        &self.clip_planes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn front_view() -> ViewState {
        ViewState::perspective(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            std::f32::consts::FRAC_PI_4,
            UVec2::new(800, 600),
        )
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let view = front_view();
        let ray = view.ray_from_point(Vec2::new(400.0, 300.0)).unwrap();
        assert!(ray.direction.abs_diff_eq(Vec3::NEG_Z, 1e-5));
        assert!((ray.origin.z - 4.9).abs() < 1e-3);
    }

    #[test]
    fn test_project_then_cast_round_trip() {
        let view = front_view();
        let world = Vec3::new(0.4, -0.3, 0.5);
        let screen = view.project_to_screen(world).unwrap();
        let ray = view.ray_from_point(screen.truncate()).unwrap();
        let to_point = world - ray.origin;
        let off_axis = to_point - ray.direction * to_point.dot(ray.direction);
        assert!(off_axis.length() < 1e-4);
    }

    #[test]
    fn test_behind_camera_does_not_project() {
        let view = front_view();
        assert!(view.project_to_screen(Vec3::new(0.0, 0.0, 10.0)).is_none());
    }

    #[test]
    fn test_pixel_size_grows_with_distance() {
        let view = front_view();
        let near = view.world_per_pixel_at(Vec3::new(0.0, 0.0, 3.0)).unwrap();
        let far = view.world_per_pixel_at(Vec3::new(0.0, 0.0, -3.0)).unwrap();
        assert!(far > near);
        // Visible height at distance 5 with a 45 degree fov over 600 px.
        let expected = 2.0 * 5.0 * (std::f32::consts::FRAC_PI_8).tan() / 600.0;
        let at_target = view.world_per_pixel_at(Vec3::ZERO).unwrap();
        assert!((at_target / expected - 1.0).abs() < 0.02);
    }

    #[test]
    fn test_clip_planes() {
        let view = front_view().with_clip_plane(Vec4::new(1.0, 0.0, 0.0, 0.0));
        assert!(view.is_clipped(Vec3::new(-1.0, 0.0, 0.0)));
        assert!(!view.is_clipped(Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_orthographic_rays_are_parallel() {
        let view = ViewState::orthographic(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::ZERO,
            2.0,
            UVec2::new(400, 400),
        );
        let a = view.ray_from_point(Vec2::new(10.0, 10.0)).unwrap();
        let b = view.ray_from_point(Vec2::new(390.0, 200.0)).unwrap();
        assert!(a.direction.abs_diff_eq(b.direction, 1e-5));
    }
}
