//! Core types for snapscope.
//!
//! This crate holds everything a snap query needs that does not touch a
//! render target:
//! - [`SnapOptions`] and [`SnapMode`] configuration
//! - mesh sources ([`Mesh`], [`EditMesh`], [`SharedMesh`]) and scene objects
//! - the [`Viewport`] the query runs against
//! - flat [`IndexArrays`] built from mesh connectivity
//! - pick id encoding and the [`SnapHit`] result type

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Index and pixel arithmetic moves between u32, usize and f32 constantly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]

pub mod error;
pub mod geometry;
pub mod index_arrays;
pub mod mesh;
pub mod object;
pub mod options;
pub mod pick;
pub mod view;

pub use error::{Result, SnapError};
pub use geometry::{Aabb, Ray};
pub use index_arrays::{IndexArrays, LocalPrimitive};
pub use mesh::{EditMesh, Mesh, MeshData, MeshKey, MeshTopology, SharedMesh};
pub use object::{CandidateId, SceneObject, SnapObject};
pub use options::{SnapMode, SnapOptions, DEFAULT_PIXEL_THRESHOLD, DEFAULT_PROMOTION_SPLIT};
pub use pick::{ElementIndices, IdRange, PrimitiveKind, SnapHit};
pub use view::{ViewState, Viewport, MAX_CLIP_PLANES};

// Re-export glam types for convenience
pub use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};
