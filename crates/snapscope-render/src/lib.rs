//! Id render targets for snapscope.
//!
//! A snap pass draws every candidate's faces, edges and points into an
//! offscreen buffer of primitive ids. This crate provides the
//! [`IdRenderTarget`] abstraction and two implementations:
//! - [`SoftwareTarget`]: a deterministic CPU rasterizer
//! - [`GpuTarget`]: a wgpu backend using an `R32Uint` color target

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Pixel arithmetic moves between integer and float types constantly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::similar_names)]

pub mod buffer;
pub mod camera;
pub mod error;
pub mod gpu;
pub mod software;
pub mod target;

pub use camera::{Camera, ProjectionMode};
pub use error::{RenderError, RenderResult};
pub use gpu::{GpuBatches, GpuTarget};
pub use software::SoftwareTarget;
pub use target::{DrawParams, IdBuffer, IdRenderTarget, PassParams, TargetStats};
