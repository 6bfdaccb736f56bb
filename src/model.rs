//! Vehicle data model: frames, attributes, trajectory segments, render model
//!
//! **Why**: Every stage of the engine (source, caches, window, playback,
//! pipeline) exchanges the same handful of shapes. Keeping them in one module
//! with validated constructors means downstream code never re-checks
//! parallel-array invariants.
//!
//! **Used by**: source (produces frames/segments), playback (consumes them),
//! render/server (consume the render model), pipeline (serializes frames)
//!
//! # Shapes
//!
//! - `VehicleFrame`: one timestamp's worth of state, parallel-indexed arrays
//! - `VehicleAttributes`: first-seen dimensions/class, insert-only cached
//! - `DisplayColor`: sticky pseudo-random RGB per vehicle id
//! - `TrajectorySegment`: one vehicle's time/x/y arrays with first/last bounds
//! - `RenderModel`: boxes + per-lane lines handed to the external renderer

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque vehicle identifier (document id in the trajectory store)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(pub String);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VehicleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-vehicle physical attributes, keyed by [`VehicleId`].
///
/// First-seen values are authoritative: once cached they are never updated
/// (see `cache` module docs). `class` is absent when the dimensions were
/// embedded in the frame rather than looked up from the trajectory store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleAttributes {
    /// Vehicle length in feet
    pub length: f64,
    /// Vehicle width in feet
    pub width: f64,
    /// Coarse vehicle class from the store, if known
    pub class: Option<u8>,
}

/// RGB display color, components in `[0, 1]`.
///
/// Assigned the first time an id is observed; stable for the id's lifetime
/// in the color cache, re-rolled only if the id is evicted and re-enters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl DisplayColor {
    /// Roll a pseudo-random color. Determinism is not required, only
    /// per-id stability, which the insert-only color cache provides.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        // `gen` is a reserved word in edition 2024
        Self {
            r: rng.r#gen::<f32>(),
            g: rng.r#gen::<f32>(),
            b: rng.r#gen::<f32>(),
        }
    }
}

/// Length/width pair embedded in a raw frame (feet)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
}

/// Data model validation errors
#[derive(Debug)]
pub enum ModelError {
    /// Frame arrays are not parallel-indexed
    MalformedFrame { timestamp: f64, detail: String },
    /// Segment arrays disagree in length or bounds
    MalformedSegment { id: VehicleId, detail: String },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::MalformedFrame { timestamp, detail } => {
                write!(f, "malformed frame at t={}: {}", timestamp, detail)
            }
            ModelError::MalformedSegment { id, detail } => {
                write!(f, "malformed segment {}: {}", id, detail)
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// One timestamp's worth of vehicle state, normalized at the source boundary.
///
/// Invariant: `ids`, `positions` and (when present) `dimensions` have equal
/// length. Enforced by [`VehicleFrame::new`]; the struct is immutable after
/// creation and discarded after the tick that consumes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleFrame {
    /// Seconds, monotonic across the stream
    pub timestamp: f64,
    pub ids: Vec<VehicleId>,
    /// `(x, y)` in feet, parallel-indexed with `ids`
    pub positions: Vec<(f64, f64)>,
    /// Embedded dimensions, parallel-indexed with `ids`; `None` means the
    /// caller must resolve attributes through the trajectory store
    pub dimensions: Option<Vec<Dimensions>>,
}

impl VehicleFrame {
    pub fn new(
        timestamp: f64,
        ids: Vec<VehicleId>,
        positions: Vec<(f64, f64)>,
        dimensions: Option<Vec<Dimensions>>,
    ) -> Result<Self, ModelError> {
        if ids.len() != positions.len() {
            return Err(ModelError::MalformedFrame {
                timestamp,
                detail: format!("{} ids vs {} positions", ids.len(), positions.len()),
            });
        }
        if let Some(dims) = &dimensions {
            if dims.len() != ids.len() {
                return Err(ModelError::MalformedFrame {
                    timestamp,
                    detail: format!("{} ids vs {} dimensions", ids.len(), dims.len()),
                });
            }
        }
        Ok(Self { timestamp, ids, positions, dimensions })
    }

    /// Number of vehicles in the frame
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One vehicle's trajectory over a contiguous time span.
///
/// Invariant: all parallel arrays equal length, `first_timestamp` equals
/// `timestamps[0]` and `last_timestamp` equals `timestamps[last]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySegment {
    pub id: VehicleId,
    pub first_timestamp: f64,
    pub last_timestamp: f64,
    pub timestamps: Vec<f64>,
    pub x_positions: Vec<f64>,
    pub y_positions: Vec<f64>,
}

impl TrajectorySegment {
    /// Build a segment, deriving the first/last bounds from `timestamps`.
    pub fn new(
        id: VehicleId,
        timestamps: Vec<f64>,
        x_positions: Vec<f64>,
        y_positions: Vec<f64>,
    ) -> Result<Self, ModelError> {
        if timestamps.is_empty() {
            return Err(ModelError::MalformedSegment {
                id,
                detail: "empty timestamps".to_string(),
            });
        }
        if timestamps.len() != x_positions.len() || timestamps.len() != y_positions.len() {
            return Err(ModelError::MalformedSegment {
                id,
                detail: format!(
                    "{} timestamps vs {} x vs {} y",
                    timestamps.len(),
                    x_positions.len(),
                    y_positions.len()
                ),
            });
        }
        let first_timestamp = timestamps[0];
        let last_timestamp = timestamps[timestamps.len() - 1];
        Ok(Self { id, first_timestamp, last_timestamp, timestamps, x_positions, y_positions })
    }

    /// Re-check the parallel-array and bounds invariants (for segments that
    /// arrived over a deserialization boundary rather than through `new`).
    pub fn validate(&self) -> Result<(), ModelError> {
        let n = self.timestamps.len();
        if n == 0 {
            return Err(ModelError::MalformedSegment {
                id: self.id.clone(),
                detail: "empty timestamps".to_string(),
            });
        }
        if self.x_positions.len() != n || self.y_positions.len() != n {
            return Err(ModelError::MalformedSegment {
                id: self.id.clone(),
                detail: format!(
                    "{} timestamps vs {} x vs {} y",
                    n,
                    self.x_positions.len(),
                    self.y_positions.len()
                ),
            });
        }
        if self.first_timestamp != self.timestamps[0]
            || self.last_timestamp != self.timestamps[n - 1]
        {
            return Err(ModelError::MalformedSegment {
                id: self.id.clone(),
                detail: "first/last bounds disagree with timestamps".to_string(),
            });
        }
        Ok(())
    }
}

/// One vehicle box in the overhead view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxGlyph {
    pub id: VehicleId,
    /// Rear-left corner, feet
    pub x: f64,
    pub y: f64,
    pub length: f64,
    pub width: f64,
    pub color: DisplayColor,
}

/// One drawable line in a per-lane time-space strip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneLine {
    pub id: VehicleId,
    /// Lane index the run belongs to (see `lanes` module)
    pub lane: usize,
    pub timestamps: Vec<f64>,
    pub x_positions: Vec<f64>,
    pub color: DisplayColor,
}

impl LaneLine {
    /// Timestamp of the run's last point (eviction key)
    pub fn last_timestamp(&self) -> f64 {
        self.timestamps.last().copied().unwrap_or(f64::NEG_INFINITY)
    }
}

/// Fully resolved output of one playback tick, consumed by the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderModel {
    /// Virtual clock for the tick (seconds)
    pub clock: f64,
    /// Visible time window `[left, right]`
    pub window: (f64, f64),
    pub boxes: Vec<BoxGlyph>,
    pub lines: Vec<LaneLine>,
}
