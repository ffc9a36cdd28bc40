//! Scene objects eligible for snapping.

use std::sync::{Arc, PoisonError, RwLock};

use glam::Mat4;

use crate::mesh::SharedMesh;

/// A scene object the snap system can query.
///
/// The snap system only borrows objects: it keeps weak references and
/// silently drops candidates whose object has gone away.
pub trait SnapObject: Send + Sync {
    /// Object-to-world transform.
    fn world_matrix(&self) -> Mat4;

    /// Mesh geometry, or `None` for objects snapped as a single point at
    /// their origin.
    fn mesh(&self) -> Option<Arc<SharedMesh>>;

    /// Display name used in logs.
    fn name(&self) -> &str {
        ""
    }
}

/// Handle to a registered snap candidate.
///
/// Slots are reused after unregistration; the generation tells a reused
/// slot apart from the candidate that held it before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateId {
    pub index: u32,
    pub generation: u32,
}

/// A plain scene object with a settable transform.
#[derive(Debug)]
pub struct SceneObject {
    name: String,
    transform: RwLock<Mat4>,
    mesh: Option<Arc<SharedMesh>>,
}

impl SceneObject {
    /// Creates an object showing `mesh`.
    pub fn with_mesh(name: impl Into<String>, mesh: Arc<SharedMesh>, transform: Mat4) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            transform: RwLock::new(transform),
            mesh: Some(mesh),
        })
    }

    /// Creates an object without geometry (a light, empty or camera).
    pub fn empty(name: impl Into<String>, transform: Mat4) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            transform: RwLock::new(transform),
            mesh: None,
        })
    }

    /// Replaces the object-to-world transform.
    pub fn set_transform(&self, transform: Mat4) {
        *self.transform.write().unwrap_or_else(PoisonError::into_inner) = transform;
    }
}

impl SnapObject for SceneObject {
    fn world_matrix(&self) -> Mat4 {
        *self.transform.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn mesh(&self) -> Option<Arc<SharedMesh>> {
        self.mesh.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use glam::Vec3;

    #[test]
    fn test_transform_updates() {
        let object = SceneObject::empty("empty", Mat4::IDENTITY);
        assert_eq!(object.world_matrix(), Mat4::IDENTITY);
        let moved = Mat4::from_translation(Vec3::X);
        object.set_transform(moved);
        assert_eq!(object.world_matrix(), moved);
        assert!(object.mesh().is_none());
        assert_eq!(object.name(), "empty");
    }

    #[test]
    fn test_objects_share_mesh() {
        let mesh = SharedMesh::new(Mesh::default());
        let a = SceneObject::with_mesh("a", Arc::clone(&mesh), Mat4::IDENTITY);
        let b = SceneObject::with_mesh("b", Arc::clone(&mesh), Mat4::IDENTITY);
        assert_eq!(a.mesh().unwrap().key(), b.mesh().unwrap().key());
    }
}
