//! Configuration options for snap queries.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapError};

/// Default search radius in pixels (a 25x25 window).
pub const DEFAULT_PIXEL_THRESHOLD: u32 = 12;

/// Default vertex promotion split: an edge hit with `t < 0.25` or
/// `t > 0.75` may be promoted to its nearer endpoint.
pub const DEFAULT_PROMOTION_SPLIT: f32 = 0.25;

/// Which primitive kinds take part in snapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapMode {
    /// Snap to mesh vertices.
    pub vertex: bool,
    /// Snap to points along mesh edges.
    pub edge: bool,
    /// Snap to points on mesh faces.
    pub face: bool,
}

impl Default for SnapMode {
    fn default() -> Self {
        Self::ALL
    }
}

impl SnapMode {
    /// Every primitive kind enabled.
    pub const ALL: Self = Self {
        vertex: true,
        edge: true,
        face: true,
    };

    /// Creates a mode from the three flags.
    #[must_use]
    pub const fn new(vertex: bool, edge: bool, face: bool) -> Self {
        Self { vertex, edge, face }
    }

    /// Faces only.
    #[must_use]
    pub const fn faces() -> Self {
        Self::new(false, false, true)
    }

    /// Returns true if vertex or edge snapping is enabled.
    #[must_use]
    pub fn any_wire(self) -> bool {
        self.vertex || self.edge
    }

    /// Returns true if nothing can be snapped to.
    #[must_use]
    pub fn is_empty(self) -> bool {
        !(self.vertex || self.edge || self.face)
    }
}

/// Options controlling snap queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapOptions {
    /// Enabled primitive kinds.
    pub mode: SnapMode,

    /// Search radius in pixels around the cursor.
    pub pixel_threshold: u32,

    /// Edge fraction below which (or above `1 - split`) an edge hit is
    /// promoted to its endpoint when vertex snapping is on.
    pub promotion_split: f32,

    /// NDC depth bias applied to the active candidate so it wins ties
    /// against near-coincident geometry.
    pub active_depth_bias: f32,

    /// NDC depth offset pulling edges (and twice that, points) toward the
    /// camera relative to the faces they bound.
    pub wire_depth_offset: f32,

    /// Upper bound on ids assigned in a single pass.
    pub max_primitive_ids: u32,
}

impl Default for SnapOptions {
    fn default() -> Self {
        Self {
            mode: SnapMode::ALL,
            pixel_threshold: DEFAULT_PIXEL_THRESHOLD,
            promotion_split: DEFAULT_PROMOTION_SPLIT,
            active_depth_bias: 2.0e-5,
            wire_depth_offset: 1.0e-5,
            max_primitive_ids: u32::MAX - 1,
        }
    }
}

impl SnapOptions {
    /// Sets the enabled primitive kinds.
    #[must_use]
    pub fn with_mode(mut self, mode: SnapMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the pixel threshold.
    #[must_use]
    pub fn with_pixel_threshold(mut self, px: u32) -> Self {
        self.pixel_threshold = px;
        self
    }

    /// Checks every field against its accepted range.
    pub fn validate(&self) -> Result<()> {
        if self.pixel_threshold == 0 || self.pixel_threshold > 255 {
            return Err(SnapError::InvalidOption(format!(
                "pixel_threshold must be in 1..=255, got {}",
                self.pixel_threshold
            )));
        }
        if !(0.0..=0.5).contains(&self.promotion_split) {
            return Err(SnapError::InvalidOption(format!(
                "promotion_split must be in [0, 0.5], got {}",
                self.promotion_split
            )));
        }
        if self.active_depth_bias < 0.0 || self.wire_depth_offset < 0.0 {
            return Err(SnapError::InvalidOption(
                "depth biases must not be negative".to_string(),
            ));
        }
        if self.max_primitive_ids == 0 {
            return Err(SnapError::InvalidOption(
                "max_primitive_ids must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates options from JSON. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Serializes the options to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
