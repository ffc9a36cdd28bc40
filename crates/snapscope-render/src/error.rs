//! Rendering error types.

use thiserror::Error;

/// Errors that can occur while drawing or reading back an id target.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// The target was asked for a zero-sized buffer.
    #[error("id target size must be non-zero, got {width}x{height}")]
    ZeroSize { width: u32, height: u32 },

    /// A draw was issued outside `bind`/`unbind`.
    #[error("id target is not bound")]
    NotBound,

    /// Mapping the readback buffer failed.
    #[error("readback failed: {0}")]
    ReadbackFailed(String),

    /// Timeout waiting for GPU.
    #[error("timeout waiting for GPU")]
    Timeout,
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

impl From<RenderError> for snapscope_core::SnapError {
    fn from(err: RenderError) -> Self {
        snapscope_core::SnapError::Render(err.to_string())
    }
}
