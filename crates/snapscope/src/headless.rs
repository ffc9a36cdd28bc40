//! Headless GPU snapping.
//!
//! Creates a wgpu device without a window and wraps it in a picker. Useful
//! for tools that snap against scenes they never display, and for tests.

use pollster::FutureExt;
use snapscope_render::GpuTarget;

use crate::{Result, SnapOptions, SpiralPicker};

/// Creates a picker drawing into a new headless GPU target.
///
/// Blocks until the adapter and device are ready. Fails when no adapter is
/// available.
///
/// # Example
/// ```no_run
/// use snapscope::*;
///
/// let mut picker = headless::gpu_picker(SnapOptions::default(), 800, 600).unwrap();
/// let view = ViewState::perspective(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 0.8, UVec2::new(800, 600));
/// let hit = picker.query(&view, Vec2::new(400.0, 300.0)).unwrap();
/// assert!(hit.is_none());
/// ```
pub fn gpu_picker(options: SnapOptions, width: u32, height: u32) -> Result<SpiralPicker<GpuTarget>> {
    let target = GpuTarget::new_headless(width, height).block_on()?;
    SpiralPicker::new(target, options)
}
