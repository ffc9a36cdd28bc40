//! Pick ids and snap results.
//!
//! Every primitive drawn in a snap pass gets a scene-unique id. Each
//! candidate owns the contiguous range `[first, first + count)`; inside it,
//! faces come first, then edges, then points. The id buffer stores `id + 1`
//! so that zero is left for the background.

use glam::{UVec2, Vec3};

use crate::object::CandidateId;

/// Pixel value of the cleared id buffer.
pub const BACKGROUND: u32 = 0;

/// Encodes a primitive id as an id buffer value.
#[must_use]
pub fn id_to_pixel(id: u32) -> u32 {
    id + 1
}

/// Decodes an id buffer value; `None` for background.
#[must_use]
pub fn pixel_to_id(pixel: u32) -> Option<u32> {
    pixel.checked_sub(1)
}

/// The ids assigned to one candidate in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdRange {
    pub first: u32,
    pub count: u32,
}

impl IdRange {
    /// One past the last id of the range.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.first + self.count
    }

    /// Returns true if `id` belongs to this range.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        id >= self.first && id < self.end()
    }

    /// Offset of `id` inside the range.
    #[must_use]
    pub fn local(&self, id: u32) -> Option<u32> {
        self.contains(id).then(|| id - self.first)
    }
}

/// Kind of primitive a snap resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// A mesh vertex (or an object origin).
    Vertex,
    /// A point along a mesh edge.
    Edge,
    /// A point on a mesh face.
    Face,
}

/// Underlying mesh elements of a snap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementIndices {
    /// A single vertex.
    Vertex(u32),
    /// An edge with the fraction of the snapped point from `v0` to `v1`.
    Edge { v0: u32, v1: u32, t: f32 },
    /// A triangle and the polygon it was cut from.
    Face { tri: [u32; 3], polygon: u32 },
}

impl ElementIndices {
    /// The primitive kind these indices describe.
    #[must_use]
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            ElementIndices::Vertex(_) => PrimitiveKind::Vertex,
            ElementIndices::Edge { .. } => PrimitiveKind::Edge,
            ElementIndices::Face { .. } => PrimitiveKind::Face,
        }
    }
}

/// Result of a successful snap query.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapHit {
    /// The candidate that was hit.
    pub candidate: CandidateId,
    /// Kind actually resolved (an edge may be promoted to a vertex).
    pub kind: PrimitiveKind,
    /// Kind found in the id buffer.
    pub rasterized_kind: PrimitiveKind,
    /// Element indices in the candidate's mesh.
    pub elements: ElementIndices,
    /// World-space snap location.
    pub position: Vec3,
    /// Pixel where the winning id was found.
    pub pixel: UVec2,
}
