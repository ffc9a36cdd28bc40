//! snapscope: real-time vertex, edge and face snapping for 3D editors.
//!
//! Given a cursor position and a camera, a [`SpiralPicker`] finds the
//! nearest visible vertex, edge or face point among its registered
//! candidates. Occlusion is handled by drawing every candidate's primitives
//! into an offscreen id buffer; a spiral search around the cursor then picks
//! the nearest id and the resolver turns it into an exact world position.
//!
//! # Quick Start
//!
//! ```
//! use snapscope::*;
//!
//! fn main() -> Result<()> {
//!     let mesh = SharedMesh::new(Mesh::new(
//!         vec![
//!             Vec3::new(-1.0, -1.0, 0.0),
//!             Vec3::new(1.0, -1.0, 0.0),
//!             Vec3::new(1.0, 1.0, 0.0),
//!             Vec3::new(-1.0, 1.0, 0.0),
//!         ],
//!         vec![vec![0, 1, 2, 3]],
//!     )?);
//!     let quad = SceneObject::with_mesh("quad", mesh, Mat4::IDENTITY);
//!
//!     let mut picker = SpiralPicker::new(SoftwareTarget::new(1, 1)?, SnapOptions::default())?;
//!     picker.register(quad.clone(), Mat4::IDENTITY);
//!
//!     let view = ViewState::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 0.8, UVec2::new(64, 64));
//!     let hit = picker.query(&view, Vec2::new(32.0, 32.0))?;
//!     assert!(hit.is_some());
//!     Ok(())
//! }
//! ```
//!
//! # Targets
//!
//! - [`SoftwareTarget`] rasterizes on the CPU and needs no GPU
//! - [`GpuTarget`] draws with wgpu; see [`headless::gpu_picker`]

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
mod candidate;
pub mod headless;
pub mod picker;
pub mod resolve;
pub mod spiral;

pub use cache::{CacheHandle, CacheKey, GeometryCache};
pub use picker::{PickerStats, SpiralPicker};
pub use resolve::{ResolveContext, Resolved};
pub use spiral::{ring_offsets, spiral_search, SpiralHit};

// Re-export core types
pub use snapscope_core::{
    geometry, Aabb, CandidateId, EditMesh, ElementIndices, IdRange, IndexArrays, LocalPrimitive,
    Mesh, MeshData, MeshKey, MeshTopology, PrimitiveKind, Ray, Result, SceneObject, SharedMesh,
    SnapError, SnapHit, SnapMode, SnapObject, SnapOptions, ViewState, Viewport,
    DEFAULT_PIXEL_THRESHOLD, DEFAULT_PROMOTION_SPLIT, MAX_CLIP_PLANES,
};
pub use snapscope_core::{Mat4, UVec2, Vec2, Vec3, Vec4};

// Re-export render types
pub use snapscope_render::{
    Camera, DrawParams, GpuTarget, IdBuffer, IdRenderTarget, PassParams, ProjectionMode,
    RenderError, SoftwareTarget, TargetStats,
};
