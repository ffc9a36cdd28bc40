//! Error types for snapscope.

use thiserror::Error;

use crate::object::CandidateId;

/// The main error type for snapscope operations.
///
/// Stale objects, degenerate geometry and id-space exhaustion are handled
/// inside a query and never show up here.
#[derive(Error, Debug)]
pub enum SnapError {
    /// A candidate handle does not refer to a registered candidate.
    #[error("snap candidate {0:?} not found")]
    CandidateNotFound(CandidateId),

    /// An option value is outside its accepted range.
    #[error("invalid snap option: {0}")]
    InvalidOption(String),

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A polygon or edge references a vertex that does not exist.
    #[error("vertex index {index} out of range for mesh with {len} vertices")]
    IndexOutOfRange { index: u32, len: usize },

    /// The id render target failed.
    #[error("render error: {0}")]
    Render(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for snapscope operations.
pub type Result<T> = std::result::Result<T, SnapError>;
