//! The id render target abstraction.
//!
//! A target owns a color buffer of primitive ids plus a depth buffer, both
//! sized to the viewport. A snap pass runs `clear`, `bind`, one `draw` per
//! candidate, `unbind`, then a single `read_back` of the whole id buffer.

use std::sync::Arc;

use glam::{Mat4, UVec2, Vec4};
use snapscope_core::pick::BACKGROUND;
use snapscope_core::IndexArrays;

use crate::error::RenderResult;

/// Per-pass parameters shared by every draw.
#[derive(Debug, Clone, PartialEq)]
pub struct PassParams {
    /// World-to-clip transform.
    pub view_projection: Mat4,
    /// World clip planes; fragments with `dot(n, p) + d < 0` are discarded.
    pub clip_planes: Vec<Vec4>,
}

/// Per-draw parameters for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    /// Object-to-world transform.
    pub model: Mat4,
    /// Id of the first primitive drawn.
    pub id_offset: u32,
    /// NDC depth subtracted from every primitive of this draw.
    pub depth_bias: f32,
    /// Extra NDC depth subtracted from edges, and twice from points.
    pub wire_offset: f32,
}

impl DrawParams {
    /// Depth bias for faces, edges and points respectively.
    #[must_use]
    pub fn biases(&self) -> [f32; 3] {
        [
            self.depth_bias,
            self.depth_bias + self.wire_offset,
            self.depth_bias + 2.0 * self.wire_offset,
        ]
    }
}

/// Counters kept by a target, used to observe cache hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetStats {
    pub resizes: u64,
    pub clears: u64,
    pub draw_calls: u64,
    pub readbacks: u64,
}

/// A CPU copy of the id buffer, row-major from the top-left pixel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl IdBuffer {
    /// Creates a background-filled buffer.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![BACKGROUND; (width as usize) * (height as usize)],
        }
    }

    /// Wraps existing pixel data.
    #[must_use]
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u32>) -> Option<Self> {
        (pixels.len() == (width as usize) * (height as usize)).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Buffer size in pixels.
    #[must_use]
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// Pixel value at `(x, y)`, or `None` outside the buffer.
    #[must_use]
    pub fn get(&self, x: i64, y: i64) -> Option<u32> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Raw pixel values.
    #[must_use]
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Replaces the contents, reallocating when the size changes.
    pub fn assign(&mut self, width: u32, height: u32, pixels: impl IntoIterator<Item = u32>) {
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.extend(pixels);
    }
}

/// An offscreen id + depth buffer that candidates are drawn into.
pub trait IdRenderTarget {
    /// Uploaded draw batches for one geometry index cache.
    type Batches;

    /// Uploads flat arrays as draw batches.
    fn upload(&mut self, arrays: &Arc<IndexArrays>) -> RenderResult<Self::Batches>;

    /// Releases draw batches.
    fn release(&mut self, batches: Self::Batches) {
        drop(batches);
    }

    /// Current size in pixels.
    fn size(&self) -> UVec2;

    /// Reallocates both buffers; contents are not preserved.
    fn resize(&mut self, width: u32, height: u32) -> RenderResult<()>;

    /// Zeroes the id buffer and resets depth to far.
    fn clear(&mut self);

    /// Makes this target the draw destination for a pass.
    fn bind(&mut self, pass: &PassParams);

    /// Draws all primitives of `batches`; returns how many were drawn.
    fn draw(&mut self, batches: &Self::Batches, params: &DrawParams) -> RenderResult<u32>;

    /// Finishes the pass.
    fn unbind(&mut self) -> RenderResult<()>;

    /// Copies the whole id buffer into `out`.
    fn read_back(&mut self, out: &mut IdBuffer) -> RenderResult<()>;

    /// Work counters.
    fn stats(&self) -> TargetStats;
}
