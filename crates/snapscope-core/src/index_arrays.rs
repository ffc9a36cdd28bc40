//! Flat primitive arrays built from mesh connectivity.
//!
//! These are the CPU half of a geometry index cache: the render target
//! uploads them as draw batches, and the resolver reads them back to turn a
//! hit into a position.

use std::collections::HashSet;

use glam::Vec3;

use crate::mesh::MeshTopology;
use crate::options::SnapMode;
use crate::pick::{ElementIndices, PrimitiveKind};

/// Triangles, edges and points of one mesh in draw order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexArrays {
    /// Object-space vertex positions.
    pub positions: Vec<Vec3>,
    /// Fan-triangulated polygons.
    pub tris: Vec<[u32; 3]>,
    /// Source polygon of each triangle.
    pub tri_to_polygon: Vec<u32>,
    /// Unique polygon boundary edges (sorted pairs) followed by loose edges.
    pub edges: Vec<[u32; 2]>,
    /// Vertices drawn as points.
    pub points: Vec<u32>,
}

/// A primitive addressed by its local id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalPrimitive {
    Face(u32),
    Edge(u32),
    Point(u32),
}

impl LocalPrimitive {
    /// Kind as rasterized.
    #[must_use]
    pub fn kind(self) -> PrimitiveKind {
        match self {
            LocalPrimitive::Face(_) => PrimitiveKind::Face,
            LocalPrimitive::Edge(_) => PrimitiveKind::Edge,
            LocalPrimitive::Point(_) => PrimitiveKind::Vertex,
        }
    }
}

impl IndexArrays {
    /// Builds the arrays for the enabled snap kinds.
    ///
    /// Faces are emitted only for face snapping and edges only for edge
    /// snapping. Points are the vertices without a visible edge when both
    /// vertex and edge snapping are on (other vertices are reached through
    /// edge hits), every
    /// visible vertex when vertex snapping is on without edge snapping, and
    /// nothing otherwise. Hidden vertices and every element touching one
    /// are left out. The output depends only on the topology and the mode.
    pub fn build(topology: &dyn MeshTopology, mode: SnapMode) -> Self {
        let positions = topology.positions().to_vec();
        let visible = |v: u32| !topology.is_vertex_hidden(v);

        let mut tris = Vec::new();
        let mut tri_to_polygon = Vec::new();
        if mode.face {
            for (polygon_index, polygon) in topology.polygons().iter().enumerate() {
                if polygon.len() < 3 || !polygon.iter().all(|&v| visible(v)) {
                    continue;
                }
                let v0 = polygon[0];
                for i in 1..(polygon.len() - 1) {
                    tris.push([v0, polygon[i], polygon[i + 1]]);
                    tri_to_polygon.push(polygon_index as u32);
                }
            }
        }

        let visible_edges: Vec<[u32; 2]> = collect_edges(topology)
            .into_iter()
            .filter(|&[a, b]| visible(a) && visible(b))
            .collect();

        let mut edges = Vec::new();
        if mode.edge {
            edges.extend_from_slice(&visible_edges);
        }

        let mut points = Vec::new();
        if mode.vertex {
            let vertex_count = positions.len() as u32;
            if mode.edge {
                let mut has_edge = vec![false; positions.len()];
                for &[a, b] in &visible_edges {
                    has_edge[a as usize] = true;
                    has_edge[b as usize] = true;
                }
                points.extend((0..vertex_count).filter(|&v| !has_edge[v as usize] && visible(v)));
            } else {
                points.extend((0..vertex_count).filter(|&v| visible(v)));
            }
        }

        Self {
            positions,
            tris,
            tri_to_polygon,
            edges,
            points,
        }
    }

    /// Single-point placeholder for objects without mesh geometry.
    #[must_use]
    pub fn point(position: Vec3) -> Self {
        Self {
            positions: vec![position],
            points: vec![0],
            ..Self::default()
        }
    }

    /// Total number of primitives, i.e. ids this cache consumes per draw.
    #[must_use]
    pub fn primitive_count(&self) -> u32 {
        (self.tris.len() + self.edges.len() + self.points.len()) as u32
    }

    /// Returns true if nothing would be drawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.primitive_count() == 0
    }

    /// Maps a local id to the primitive it was assigned to.
    #[must_use]
    pub fn classify(&self, local: u32) -> Option<LocalPrimitive> {
        let faces = self.tris.len() as u32;
        let edges = self.edges.len() as u32;
        let points = self.points.len() as u32;
        if local < faces {
            Some(LocalPrimitive::Face(local))
        } else if local < faces + edges {
            Some(LocalPrimitive::Edge(local - faces))
        } else if local < faces + edges + points {
            Some(LocalPrimitive::Point(local - faces - edges))
        } else {
            None
        }
    }

    /// Element indices of a primitive before any resolution.
    #[must_use]
    pub fn elements(&self, primitive: LocalPrimitive) -> Option<ElementIndices> {
        match primitive {
            LocalPrimitive::Face(i) => {
                let tri = *self.tris.get(i as usize)?;
                let polygon = self.tri_to_polygon.get(i as usize).copied().unwrap_or(0);
                Some(ElementIndices::Face { tri, polygon })
            }
            LocalPrimitive::Edge(i) => {
                let [v0, v1] = *self.edges.get(i as usize)?;
                Some(ElementIndices::Edge { v0, v1, t: 0.0 })
            }
            LocalPrimitive::Point(i) => self.points.get(i as usize).map(|&v| ElementIndices::Vertex(v)),
        }
    }

    /// Object-space position of a vertex.
    #[must_use]
    pub fn position(&self, vertex: u32) -> Option<Vec3> {
        self.positions.get(vertex as usize).copied()
    }
}

/// Unique polygon boundary edges as sorted pairs, then loose edges not
/// already present.
fn collect_edges(topology: &dyn MeshTopology) -> Vec<[u32; 2]> {
    let mut edge_set: HashSet<(u32, u32)> = HashSet::new();

    for polygon in topology.polygons() {
        let n = polygon.len();
        if n < 2 {
            continue;
        }
        for i in 0..n {
            let v0 = polygon[i];
            let v1 = polygon[(i + 1) % n];
            if v0 == v1 {
                continue;
            }
            let edge = if v0 < v1 { (v0, v1) } else { (v1, v0) };
            edge_set.insert(edge);
        }
    }

    let mut edges: Vec<(u32, u32)> = edge_set.iter().copied().collect();
    edges.sort_unstable();

    for &[a, b] in topology.loose_edges() {
        if a == b {
            continue;
        }
        let edge = if a < b { (a, b) } else { (b, a) };
        if edge_set.insert(edge) {
            edges.push(edge);
        }
    }

    edges.into_iter().map(|(a, b)| [a, b]).collect()
}
