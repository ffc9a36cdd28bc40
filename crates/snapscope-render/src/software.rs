//! CPU id target.
//!
//! Rasterizes triangles, one-pixel lines and one-pixel points with the same
//! conventions as the GPU target: pixel centers at `+0.5`, NDC depth in
//! `[0, 1]`, depth test `Less`, id buffer value `id + 1`. Primitives are
//! clipped against the near and far planes; x and y are clipped by the
//! viewport rectangle.

use std::sync::Arc;

use glam::{Mat4, UVec2, Vec2, Vec3, Vec4, Vec4Swizzles};
use snapscope_core::pick::{id_to_pixel, BACKGROUND};
use snapscope_core::IndexArrays;

use crate::error::{RenderError, RenderResult};
use crate::target::{DrawParams, IdBuffer, IdRenderTarget, PassParams, TargetStats};

/// A point in screen space: pixel `x, y` and NDC depth `z`.
type ScreenPoint = Vec3;

struct BoundPass {
    view_projection: Mat4,
    inv_view_projection: Mat4,
    clip_planes: Vec<Vec4>,
}

/// Software rasterizer implementing [`IdRenderTarget`].
pub struct SoftwareTarget {
    width: u32,
    height: u32,
    ids: Vec<u32>,
    depth: Vec<f32>,
    pass: Option<BoundPass>,
    stats: TargetStats,
}

impl SoftwareTarget {
    /// Creates a cleared target.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        check_size(width, height)?;
        let len = width as usize * height as usize;
        Ok(Self {
            width,
            height,
            ids: vec![BACKGROUND; len],
            depth: vec![1.0; len],
            pass: None,
            stats: TargetStats::default(),
        })
    }

    fn to_screen(&self, clip: Vec4) -> ScreenPoint {
        let ndc = clip.xyz() / clip.w;
        Vec3::new(
            (ndc.x + 1.0) * 0.5 * self.width as f32,
            (1.0 - ndc.y) * 0.5 * self.height as f32,
            ndc.z,
        )
    }

    /// Depth-tests and writes one fragment.
    fn write_fragment(&mut self, x: i64, y: i64, depth: f32, bias: f32, pixel: u32) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        if let Some(pass) = &self.pass {
            if !pass.clip_planes.is_empty() {
                let ndc = Vec3::new(
                    (x as f32 + 0.5) / self.width as f32 * 2.0 - 1.0,
                    1.0 - (y as f32 + 0.5) / self.height as f32 * 2.0,
                    depth,
                );
                let world = pass.inv_view_projection.project_point3(ndc);
                if pass
                    .clip_planes
                    .iter()
                    .any(|plane| plane.truncate().dot(world) + plane.w < 0.0)
                {
                    return;
                }
            }
        }
        let index = y as usize * self.width as usize + x as usize;
        let biased = depth - bias;
        if biased < self.depth[index] {
            self.depth[index] = biased;
            self.ids[index] = pixel;
        }
    }

    fn raster_triangle(&mut self, clip: [Vec4; 3], bias: f32, pixel: u32) {
        let polygon = clip_polygon(&clip);
        if polygon.len() < 3 {
            return;
        }
        let screen: Vec<ScreenPoint> = polygon.iter().map(|&v| self.to_screen(v)).collect();
        for i in 1..(screen.len() - 1) {
            self.fill_triangle(screen[0], screen[i], screen[i + 1], bias, pixel);
        }
    }

    fn fill_triangle(&mut self, a: ScreenPoint, b: ScreenPoint, c: ScreenPoint, bias: f32, pixel: u32) {
        let area = edge_function(a.truncate(), b.truncate(), c.truncate());
        if area.abs() < 1e-12 {
            return;
        }

        let min = a.min(b).min(c);
        let max = a.max(b).max(c);
        let x0 = (min.x.floor() as i64).max(0);
        let y0 = (min.y.floor() as i64).max(0);
        let x1 = (max.x.ceil() as i64).min(i64::from(self.width) - 1);
        let y1 = (max.y.ceil() as i64).min(i64::from(self.height) - 1);

        for y in y0..=y1 {
            for x in x0..=x1 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge_function(b.truncate(), c.truncate(), p) / area;
                let w1 = edge_function(c.truncate(), a.truncate(), p) / area;
                let w2 = edge_function(a.truncate(), b.truncate(), p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }
                let depth = w0 * a.z + w1 * b.z + w2 * c.z;
                self.write_fragment(x, y, depth, bias, pixel);
            }
        }
    }

    fn raster_line(&mut self, a: Vec4, b: Vec4, bias: f32, pixel: u32) {
        let Some((a, b)) = clip_segment(a, b) else {
            return;
        };
        let Some((a, b)) = self.clip_to_viewport(self.to_screen(a), self.to_screen(b)) else {
            return;
        };

        let delta = b - a;
        let steps = delta.x.abs().max(delta.y.abs()).ceil().max(1.0) as u32;
        for i in 0..=steps {
            let p = a + delta * (i as f32 / steps as f32);
            self.write_fragment(p.x.floor() as i64, p.y.floor() as i64, p.z, bias, pixel);
        }
    }

    fn raster_point(&mut self, v: Vec4, bias: f32, pixel: u32) {
        if v.w <= 0.0 || v.z < 0.0 || v.z > v.w {
            return;
        }
        let p = self.to_screen(v);
        self.write_fragment(p.x.floor() as i64, p.y.floor() as i64, p.z, bias, pixel);
    }

    /// Liang-Barsky clip of a screen segment to the viewport rectangle.
    fn clip_to_viewport(&self, a: ScreenPoint, b: ScreenPoint) -> Option<(ScreenPoint, ScreenPoint)> {
        let (w, h) = (self.width as f32, self.height as f32);
        let d = b - a;
        let mut t0 = 0.0_f32;
        let mut t1 = 1.0_f32;
        for (p, q) in [(-d.x, a.x), (d.x, w - a.x), (-d.y, a.y), (d.y, h - a.y)] {
            if p.abs() < 1e-12 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
            if t0 > t1 {
                return None;
            }
        }
        Some((a + d * t0, a + d * t1))
    }
}

impl IdRenderTarget for SoftwareTarget {
    type Batches = Arc<IndexArrays>;

    fn upload(&mut self, arrays: &Arc<IndexArrays>) -> RenderResult<Self::Batches> {
        Ok(Arc::clone(arrays))
    }

    fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        check_size(width, height)?;
        let len = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.ids = vec![BACKGROUND; len];
        self.depth = vec![1.0; len];
        self.stats.resizes += 1;
        Ok(())
    }

    fn clear(&mut self) {
        self.ids.fill(BACKGROUND);
        self.depth.fill(1.0);
        self.stats.clears += 1;
    }

    fn bind(&mut self, pass: &PassParams) {
        self.pass = Some(BoundPass {
            view_projection: pass.view_projection,
            inv_view_projection: pass.view_projection.inverse(),
            clip_planes: pass.clip_planes.clone(),
        });
    }

    fn draw(&mut self, batches: &Self::Batches, params: &DrawParams) -> RenderResult<u32> {
        let mvp = self
            .pass
            .as_ref()
            .ok_or(RenderError::NotBound)?
            .view_projection
            * params.model;
        let clip: Vec<Vec4> = batches
            .positions
            .iter()
            .map(|p| mvp * p.extend(1.0))
            .collect();
        let [face_bias, edge_bias, point_bias] = params.biases();
        let mut id = params.id_offset;

        for tri in &batches.tris {
            let corners = tri.map(|v| clip[v as usize]);
            self.raster_triangle(corners, face_bias, id_to_pixel(id));
            id += 1;
        }
        for &[a, b] in &batches.edges {
            self.raster_line(clip[a as usize], clip[b as usize], edge_bias, id_to_pixel(id));
            id += 1;
        }
        for &v in &batches.points {
            self.raster_point(clip[v as usize], point_bias, id_to_pixel(id));
            id += 1;
        }

        self.stats.draw_calls += 1;
        Ok(id - params.id_offset)
    }

    fn unbind(&mut self) -> RenderResult<()> {
        self.pass.take().map(|_| ()).ok_or(RenderError::NotBound)
    }

    fn read_back(&mut self, out: &mut IdBuffer) -> RenderResult<()> {
        out.assign(self.width, self.height, self.ids.iter().copied());
        self.stats.readbacks += 1;
        Ok(())
    }

    fn stats(&self) -> TargetStats {
        self.stats
    }
}

fn check_size(width: u32, height: u32) -> RenderResult<()> {
    if width == 0 || height == 0 {
        return Err(RenderError::ZeroSize { width, height });
    }
    Ok(())
}

fn edge_function(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Signed distances to the near (`z >= 0`) and far (`z <= w`) planes.
const CLIP_PLANES: [fn(Vec4) -> f32; 2] = [|v| v.z, |v| v.w - v.z];

/// Sutherland-Hodgman clip of a clip-space polygon to the depth range.
fn clip_polygon(input: &[Vec4]) -> Vec<Vec4> {
    let mut polygon = input.to_vec();
    for plane in CLIP_PLANES {
        if polygon.is_empty() {
            break;
        }
        let mut output = Vec::with_capacity(polygon.len() + 2);
        for i in 0..polygon.len() {
            let current = polygon[i];
            let next = polygon[(i + 1) % polygon.len()];
            let (dc, dn) = (plane(current), plane(next));
            if dc >= 0.0 {
                output.push(current);
            }
            if (dc >= 0.0) != (dn >= 0.0) {
                let t = dc / (dc - dn);
                output.push(current.lerp(next, t));
            }
        }
        polygon = output;
    }
    polygon.retain(|v| v.w > 1e-12);
    polygon
}

/// Clips a clip-space segment to the depth range.
fn clip_segment(mut a: Vec4, mut b: Vec4) -> Option<(Vec4, Vec4)> {
    for plane in CLIP_PLANES {
        let (da, db) = (plane(a), plane(b));
        match (da >= 0.0, db >= 0.0) {
            (true, true) => {}
            (false, false) => return None,
            (true, false) => b = a.lerp(b, da / (da - db)),
            (false, true) => a = a.lerp(b, da / (da - db)),
        }
    }
    (a.w > 1e-12 && b.w > 1e-12).then_some((a, b))
}
