//! Maps a picked primitive to an exact world-space point.

use glam::{Mat4, Vec2, Vec3};
use snapscope_core::geometry::{ray_plane_intersect, ray_segment_fraction, triangle_normal};
use snapscope_core::{
    ElementIndices, IndexArrays, LocalPrimitive, PrimitiveKind, Ray, SnapOptions, Viewport,
};

/// A resolved snap location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub kind: PrimitiveKind,
    pub elements: ElementIndices,
    pub position: Vec3,
}

/// Inputs shared by every resolution of one query.
pub struct ResolveContext<'a> {
    pub view: &'a dyn Viewport,
    /// World ray through the cursor.
    pub ray: Ray,
    /// Cursor in pixels.
    pub cursor: Vec2,
    pub options: &'a SnapOptions,
}

impl ResolveContext<'_> {
    /// Resolves `primitive` of `arrays` drawn with object transform `world`.
    #[must_use]
    pub fn resolve(&self, arrays: &IndexArrays, world: &Mat4, primitive: LocalPrimitive) -> Option<Resolved> {
        let to_world = |v: u32| arrays.position(v).map(|p| world.transform_point3(p));

        match primitive {
            LocalPrimitive::Face(i) => {
                let tri = *arrays.tris.get(i as usize)?;
                let polygon = arrays.tri_to_polygon.get(i as usize).copied().unwrap_or(0);
                let [a, b, c] = [to_world(tri[0])?, to_world(tri[1])?, to_world(tri[2])?];
                let normal = triangle_normal(a, b, c);
                // Edge-on triangles still cover pixels; fall back to the centroid.
                let position = ray_plane_intersect(&self.ray, a, normal).unwrap_or((a + b + c) / 3.0);
                Some(Resolved {
                    kind: PrimitiveKind::Face,
                    elements: ElementIndices::Face { tri, polygon },
                    position,
                })
            }
            LocalPrimitive::Edge(i) => {
                let [v0, v1] = *arrays.edges.get(i as usize)?;
                let (a, b) = (to_world(v0)?, to_world(v1)?);
                let t = ray_segment_fraction(&self.ray, a, b);

                if let Some(promoted) = self.promote(t, [(v0, a), (v1, b)]) {
                    return Some(promoted);
                }

                let t = t.clamp(0.0, 1.0);
                Some(Resolved {
                    kind: PrimitiveKind::Edge,
                    elements: ElementIndices::Edge { v0, v1, t },
                    position: a.lerp(b, t),
                })
            }
            LocalPrimitive::Point(i) => {
                let v = *arrays.points.get(i as usize)?;
                Some(Resolved {
                    kind: PrimitiveKind::Vertex,
                    elements: ElementIndices::Vertex(v),
                    position: to_world(v)?,
                })
            }
        }
    }

    /// Swaps an edge point for the endpoint it is close to, if that endpoint
    /// is visible within the pixel threshold of the cursor.
    fn promote(&self, t: f32, endpoints: [(u32, Vec3); 2]) -> Option<Resolved> {
        if !self.options.mode.vertex {
            return None;
        }
        let split = self.options.promotion_split;
        let (vertex, position) = if t < split {
            endpoints[0]
        } else if t > 1.0 - split {
            endpoints[1]
        } else {
            return None;
        };

        if self.view.is_clipped(position) {
            return None;
        }
        let screen = self.view.project_to_screen(position)?;
        if screen.truncate().distance(self.cursor) > self.options.pixel_threshold as f32 {
            return None;
        }

        Some(Resolved {
            kind: PrimitiveKind::Vertex,
            elements: ElementIndices::Vertex(vertex),
            position,
        })
    }
}
