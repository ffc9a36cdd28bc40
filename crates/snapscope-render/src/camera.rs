//! Camera and view management.

use glam::{Mat4, UVec2, Vec3, Vec4};
use snapscope_core::{Aabb, ViewState, Viewport, MAX_CLIP_PLANES};

/// Camera projection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    /// Perspective projection.
    #[default]
    Perspective,
    /// Orthographic projection.
    Orthographic,
}

/// An orbiting 3D camera bound to a viewport size.
///
/// Implements [`Viewport`] so it can be handed to a snap query directly.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space.
    pub position: Vec3,
    /// Point the camera is looking at.
    pub target: Vec3,
    /// Up vector.
    pub up: Vec3,
    /// Field of view in radians.
    pub fov: f32,
    /// Near clipping plane.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
    /// Projection mode.
    pub projection_mode: ProjectionMode,
    /// Orthographic half height (used when `projection_mode` is Orthographic).
    pub ortho_scale: f32,
    size: UVec2,
    clip_planes: Vec<Vec4>,
}

impl Camera {
    /// Creates a new camera for a viewport of `size` pixels.
    #[must_use]
    pub fn new(size: UVec2) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_4, // 45 degrees
            near: 0.01,
            far: 1000.0,
            projection_mode: ProjectionMode::Perspective,
            ortho_scale: 1.0,
            size,
            clip_planes: Vec::new(),
        }
    }

    /// Width over height of the viewport.
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        self.size.x.max(1) as f32 / self.size.y.max(1) as f32
    }

    /// Sets the viewport size in pixels.
    pub fn set_viewport_size(&mut self, size: UVec2) {
        self.size = size;
    }

    /// Adds a world clip plane `(n, d)`. Extra planes beyond the supported
    /// maximum are ignored.
    pub fn add_clip_plane(&mut self, plane: Vec4) -> bool {
        if self.clip_planes.len() >= MAX_CLIP_PLANES {
            log::warn!("ignoring clip plane, {MAX_CLIP_PLANES} already set");
            return false;
        }
        self.clip_planes.push(plane);
        true
    }

    /// Returns the camera's forward direction.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// Orbits the camera around the target.
    pub fn orbit(&mut self, delta_x: f32, delta_y: f32) {
        let radius = (self.position - self.target).length();
        let mut theta = (self.position.x - self.target.x).atan2(self.position.z - self.target.z);
        let mut phi = ((self.position.y - self.target.y) / radius).acos();

        theta -= delta_x;
        phi = (phi - delta_y).clamp(0.01, std::f32::consts::PI - 0.01);

        self.position = self.target
            + Vec3::new(
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
                radius * phi.sin() * theta.cos(),
            );
    }

    /// Moves toward the target in perspective, shrinks `ortho_scale` in
    /// orthographic.
    pub fn zoom(&mut self, delta: f32) {
        match self.projection_mode {
            ProjectionMode::Perspective => {
                let direction = self.forward();
                let distance = (self.position - self.target).length();
                let new_distance = (distance - delta).max(0.1);
                self.position = self.target - direction * new_distance;
            }
            ProjectionMode::Orthographic => {
                let zoom_factor = 1.0 - delta * 0.4;
                self.ortho_scale = (self.ortho_scale * zoom_factor).clamp(0.01, 1000.0);
            }
        }
    }

    /// Frames a bounding box from the +Z side.
    pub fn look_at_box(&mut self, bounds: &Aabb) {
        let center = bounds.center();
        let extents = bounds.max - bounds.min;
        let size = extents.length().max(1e-3);

        self.target = center;
        self.position = center + Vec3::new(0.0, 0.0, size * 1.5);
        self.near = size * 0.001;
        self.far = size * 100.0;

        let half_height = extents.y.max(extents.x / self.aspect_ratio()) * 0.6;
        self.ortho_scale = half_height.max(0.1);
    }

    /// Snapshot of the current view as a plain [`ViewState`].
    #[must_use]
    pub fn view_state(&self) -> ViewState {
        ViewState {
            view: self.view_matrix(),
            projection: self.projection_matrix(),
            size: self.size,
            near: self.near,
            far: self.far,
            clip_planes: self.clip_planes.clone(),
        }
    }
}

impl Viewport for Camera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    fn projection_matrix(&self) -> Mat4 {
        let aspect = self.aspect_ratio();
        match self.projection_mode {
            ProjectionMode::Perspective => Mat4::perspective_rh(self.fov, aspect, self.near, self.far),
            ProjectionMode::Orthographic => {
                let half_height = self.ortho_scale;
                let half_width = half_height * aspect;
                Mat4::orthographic_rh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    self.near,
                    self.far,
                )
            }
        }
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

impl Default for Camera {
    fn default() -> Self {
        Self::new(UVec2::new(1280, 720))
    }
}
