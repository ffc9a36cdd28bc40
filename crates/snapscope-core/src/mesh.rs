//! Mesh sources the snap index is built from.
//!
//! Two shapes are supported: a stored base [`Mesh`] and a live editing-time
//! [`EditMesh`] whose hidden vertices must not be snapped to. Both are held
//! in a [`SharedMesh`], which gives them a stable identity token and a
//! generation counter that acts as the change notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use glam::Vec3;

use crate::error::{Result, SnapError};
use crate::geometry::Aabb;

/// Read access to mesh connectivity.
pub trait MeshTopology {
    /// Vertex positions in object space.
    fn positions(&self) -> &[Vec3];

    /// Polygons as lists of vertex indices (any arity >= 3 is drawn).
    fn polygons(&self) -> &[Vec<u32>];

    /// Wire edges that do not bound any polygon.
    fn loose_edges(&self) -> &[[u32; 2]];

    /// Whether a vertex is excluded from snapping.
    fn is_vertex_hidden(&self, _index: u32) -> bool {
        false
    }
}

/// A stored polygon mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    positions: Vec<Vec3>,
    polygons: Vec<Vec<u32>>,
    loose_edges: Vec<[u32; 2]>,
}

impl Mesh {
    /// Creates a mesh, checking that every polygon index is in range.
    pub fn new(positions: Vec<Vec3>, polygons: Vec<Vec<u32>>) -> Result<Self> {
        let len = positions.len();
        for &index in polygons.iter().flatten() {
            check_index(index, len)?;
        }
        Ok(Self {
            positions,
            polygons,
            loose_edges: Vec::new(),
        })
    }

    /// Adds wire edges, checking their indices.
    pub fn with_loose_edges(mut self, edges: Vec<[u32; 2]>) -> Result<Self> {
        for &index in edges.iter().flatten() {
            check_index(index, self.positions.len())?;
        }
        self.loose_edges = edges;
        Ok(self)
    }

    /// Number of vertices.
    #[must_use]
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    /// Moves a vertex.
    pub fn set_position(&mut self, index: u32, position: Vec3) -> Result<()> {
        check_index(index, self.positions.len())?;
        self.positions[index as usize] = position;
        Ok(())
    }
}

impl MeshTopology for Mesh {
    fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    fn polygons(&self) -> &[Vec<u32>] {
        &self.polygons
    }

    fn loose_edges(&self) -> &[[u32; 2]] {
        &self.loose_edges
    }
}

/// A live editing copy of a mesh.
#[derive(Debug, Clone, Default)]
pub struct EditMesh {
    mesh: Mesh,
    hidden: Vec<bool>,
}

impl EditMesh {
    /// Starts editing a copy of `mesh` with every vertex visible.
    #[must_use]
    pub fn from_mesh(mesh: Mesh) -> Self {
        let hidden = vec![false; mesh.num_vertices()];
        Self { mesh, hidden }
    }

    /// Hides or reveals a vertex.
    pub fn set_hidden(&mut self, index: u32, hidden: bool) -> Result<()> {
        check_index(index, self.hidden.len())?;
        self.hidden[index as usize] = hidden;
        Ok(())
    }

    /// Moves a vertex.
    pub fn set_position(&mut self, index: u32, position: Vec3) -> Result<()> {
        self.mesh.set_position(index, position)
    }

    /// The edited mesh, dropping hidden state.
    #[must_use]
    pub fn into_mesh(self) -> Mesh {
        self.mesh
    }
}

impl MeshTopology for EditMesh {
    fn positions(&self) -> &[Vec3] {
        self.mesh.positions()
    }

    fn polygons(&self) -> &[Vec<u32>] {
        self.mesh.polygons()
    }

    fn loose_edges(&self) -> &[[u32; 2]] {
        self.mesh.loose_edges()
    }

    fn is_vertex_hidden(&self, index: u32) -> bool {
        self.hidden.get(index as usize).copied().unwrap_or(true)
    }
}

/// Either shape a mesh source can take.
#[derive(Debug, Clone)]
pub enum MeshData {
    /// The stored base mesh.
    Base(Mesh),
    /// A working copy being edited.
    Editing(EditMesh),
}

impl MeshData {
    /// Connectivity view of whichever shape is held.
    #[must_use]
    pub fn topology(&self) -> &dyn MeshTopology {
        match self {
            MeshData::Base(mesh) => mesh,
            MeshData::Editing(edit) => edit,
        }
    }

    /// Moves a vertex in whichever shape is held.
    pub fn set_position(&mut self, index: u32, position: Vec3) -> Result<()> {
        match self {
            MeshData::Base(mesh) => mesh.set_position(index, position),
            MeshData::Editing(edit) => edit.set_position(index, position),
        }
    }
}

impl From<Mesh> for MeshData {
    fn from(mesh: Mesh) -> Self {
        MeshData::Base(mesh)
    }
}

impl From<EditMesh> for MeshData {
    fn from(edit: EditMesh) -> Self {
        MeshData::Editing(edit)
    }
}

/// Stable identity of a shared mesh, used as the geometry cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshKey(u64);

impl MeshKey {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw token value.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A mesh shared between scene objects.
#[derive(Debug)]
pub struct SharedMesh {
    key: MeshKey,
    generation: AtomicU64,
    data: RwLock<MeshData>,
    bounds: Mutex<Option<(u64, Option<Aabb>)>>,
}

impl SharedMesh {
    /// Wraps mesh data with a fresh identity.
    pub fn new(data: impl Into<MeshData>) -> Arc<Self> {
        Arc::new(Self {
            key: MeshKey::next(),
            generation: AtomicU64::new(0),
            data: RwLock::new(data.into()),
            bounds: Mutex::new(None),
        })
    }

    /// Identity token.
    #[must_use]
    pub fn key(&self) -> MeshKey {
        self.key
    }

    /// Counter bumped by every modification.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Runs `f` with read access to the connectivity.
    pub fn read<R>(&self, f: impl FnOnce(&dyn MeshTopology) -> R) -> R {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        f(guard.topology())
    }

    /// Runs `f` with write access and notifies dependents of the change.
    pub fn modify<R>(&self, f: impl FnOnce(&mut MeshData) -> R) -> R {
        let result = {
            let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        };
        self.notify_changed();
        result
    }

    /// Marks the mesh as changed without touching it.
    pub fn notify_changed(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Object-space bounds of the visible vertices, cached per generation.
    pub fn bounds(&self) -> Option<Aabb> {
        let generation = self.generation();
        let mut cached = self.bounds.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((built_for, bounds)) = *cached {
            if built_for == generation {
                return bounds;
            }
        }
        let bounds = self.read(|topology| {
            let positions = topology.positions();
            Aabb::from_points(
                (0..positions.len() as u32)
                    .filter(|&i| !topology.is_vertex_hidden(i))
                    .map(|i| positions[i as usize]),
            )
        });
        *cached = Some((generation, bounds));
        bounds
    }
}

fn check_index(index: u32, len: usize) -> Result<()> {
    if (index as usize) < len {
        Ok(())
    } else {
        Err(SnapError::IndexOutOfRange { index, len })
    }
}
