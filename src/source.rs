//! FrameSource boundary: the narrow query surface over the trajectory store
//!
//! **Why**: The engine never talks to a database driver directly. Everything
//! it needs (global time bounds, a time-ordered frame cursor, batched
//! attribute lookups, range queries over segment first-timestamps) fits
//! behind one trait, so the playback loop and the pipeline are testable
//! against an in-memory store and swappable onto any real backend.
//!
//! **Used by**: PlaybackLoop, StreamingPipeline producer, main (dataset load)
//!
//! # Raw vs normalized frames
//!
//! Store documents sometimes embed per-vehicle dimensions and sometimes
//! require a lookup by id. That duality is modeled once, here, as the
//! [`RawFrame`] sum type; `normalize` resolves it into the single
//! [`VehicleFrame`] shape the rest of the engine sees.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::model::{
    Dimensions, ModelError, TrajectorySegment, VehicleAttributes, VehicleFrame, VehicleId,
};

/// One store document's worth of vehicle state, before normalization.
///
/// `WithDimensions` corresponds to raw tracking output (dimensions inline);
/// `RequiresLookup` to reconciled output (dimensions live on the per-vehicle
/// document and must be fetched by id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawFrame {
    WithDimensions {
        timestamp: f64,
        ids: Vec<VehicleId>,
        positions: Vec<(f64, f64)>,
        dimensions: Vec<Dimensions>,
    },
    RequiresLookup {
        timestamp: f64,
        ids: Vec<VehicleId>,
        positions: Vec<(f64, f64)>,
    },
}

impl RawFrame {
    pub fn timestamp(&self) -> f64 {
        match self {
            RawFrame::WithDimensions { timestamp, .. } => *timestamp,
            RawFrame::RequiresLookup { timestamp, .. } => *timestamp,
        }
    }

    /// Resolve the sum type into the one normalized frame shape, checking
    /// the parallel-array invariant on the way through.
    pub fn normalize(self) -> Result<VehicleFrame, ModelError> {
        match self {
            RawFrame::WithDimensions { timestamp, ids, positions, dimensions } => {
                VehicleFrame::new(timestamp, ids, positions, Some(dimensions))
            }
            RawFrame::RequiresLookup { timestamp, ids, positions } => {
                VehicleFrame::new(timestamp, ids, positions, None)
            }
        }
    }
}

/// Errors at the frame-source boundary
#[derive(Debug)]
pub enum SourceError {
    /// The store holds no frames at all
    EmptyStore,
    /// Reading the backing dataset failed
    Io(std::io::Error),
    /// Decoding the backing dataset failed
    Decode(String),
    /// A store document violated the data model
    Model(ModelError),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::EmptyStore => write!(f, "store holds no frames"),
            SourceError::Io(e) => write!(f, "dataset read error: {}", e),
            SourceError::Decode(e) => write!(f, "dataset decode error: {}", e),
            SourceError::Model(e) => write!(f, "document error: {}", e),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<ModelError> for SourceError {
    fn from(e: ModelError) -> Self {
        SourceError::Model(e)
    }
}

/// Anything that can serve time-ordered vehicle frames and the vehicle-id
/// indexed collections behind them. End of stream is `Ok(None)` from the
/// cursor, never an error.
pub trait FrameSource {
    /// Smallest timestamp in the store
    fn min_timestamp(&self) -> Result<f64, SourceError>;

    /// Largest timestamp in the store
    fn max_timestamp(&self) -> Result<f64, SourceError>;

    /// Frame at or immediately after `timestamp`, without moving the cursor
    fn frame_at(&self, timestamp: f64) -> Result<Option<RawFrame>, SourceError>;

    /// Next frame in timestamp order, advancing the internal cursor;
    /// `Ok(None)` once the cursor is exhausted
    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError>;

    /// Batch attribute lookup for exactly the given ids; absent ids are
    /// simply missing from the returned map
    fn attributes_by_ids(
        &self,
        ids: &[VehicleId],
    ) -> Result<HashMap<VehicleId, VehicleAttributes>, SourceError>;

    /// Segments whose `first_timestamp` lies in `[from, to)`, ordered by
    /// descending `last_timestamp`
    fn segments_entering(&self, from: f64, to: f64)
        -> Result<Vec<TrajectorySegment>, SourceError>;
}

/// One per-vehicle record in the JSON dataset (the vehicle-id indexed
/// collection; frames are derived from it the way the store's transformed
/// collection is derived from trajectories).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRecord {
    #[serde(rename = "_id")]
    pub id: VehicleId,
    pub length: f64,
    pub width: f64,
    #[serde(default)]
    pub coarse_vehicle_class: Option<u8>,
    pub timestamps: Vec<f64>,
    pub x_positions: Vec<f64>,
    pub y_positions: Vec<f64>,
}

/// Top-level JSON dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// "raw" embeds dimensions in the derived frames; anything else leaves
    /// them to be looked up by id
    #[serde(default)]
    pub mode: Option<String>,
    pub vehicles: Vec<VehicleRecord>,
}

/// In-memory, time-ordered frame store.
///
/// Stands behind the same narrow interface a database reader would; driver
/// mechanics (connections, indexes, auth) are out of scope for the engine.
#[derive(Debug)]
pub struct MemoryFrameSource {
    frames: Vec<RawFrame>,
    attributes: HashMap<VehicleId, VehicleAttributes>,
    /// Sorted by first_timestamp ascending for the range scan
    segments: Vec<TrajectorySegment>,
    cursor: usize,
}

impl MemoryFrameSource {
    pub fn new(
        mut frames: Vec<RawFrame>,
        attributes: HashMap<VehicleId, VehicleAttributes>,
        mut segments: Vec<TrajectorySegment>,
    ) -> Self {
        frames.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        segments.sort_by(|a, b| a.first_timestamp.total_cmp(&b.first_timestamp));
        Self { frames, attributes, segments, cursor: 0 }
    }

    /// Load a JSON dataset of per-vehicle trajectories and derive the
    /// time-indexed frames from it.
    pub fn from_json(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path).map_err(SourceError::Io)?;
        let dataset: Dataset =
            serde_json::from_str(&text).map_err(|e| SourceError::Decode(e.to_string()))?;
        let source = Self::from_dataset(dataset)?;
        info!(
            "loaded dataset {}: {} frames, {} vehicles, {} segments",
            path.display(),
            source.frames.len(),
            source.attributes.len(),
            source.segments.len()
        );
        Ok(source)
    }

    /// Build the store from parsed records: one segment and one attribute
    /// entry per vehicle, frames grouped by distinct timestamp.
    pub fn from_dataset(dataset: Dataset) -> Result<Self, SourceError> {
        let embed = dataset.mode.as_deref() == Some("raw");

        let mut attributes = HashMap::new();
        let mut segments = Vec::with_capacity(dataset.vehicles.len());
        // (timestamp, id, x, y, dims) tuples, to be grouped into frames
        let mut points: Vec<(f64, VehicleId, f64, f64, Dimensions)> = Vec::new();

        for rec in dataset.vehicles {
            let seg = TrajectorySegment::new(
                rec.id.clone(),
                rec.timestamps.clone(),
                rec.x_positions.clone(),
                rec.y_positions.clone(),
            )?;
            attributes.insert(
                rec.id.clone(),
                VehicleAttributes {
                    length: rec.length,
                    width: rec.width,
                    class: rec.coarse_vehicle_class,
                },
            );
            let dims = Dimensions { length: rec.length, width: rec.width };
            for i in 0..seg.timestamps.len() {
                points.push((
                    seg.timestamps[i],
                    rec.id.clone(),
                    seg.x_positions[i],
                    seg.y_positions[i],
                    dims,
                ));
            }
            segments.push(seg);
        }

        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut frames: Vec<RawFrame> = Vec::new();
        let mut i = 0;
        while i < points.len() {
            let t = points[i].0;
            let mut ids = Vec::new();
            let mut positions = Vec::new();
            let mut dimensions = Vec::new();
            while i < points.len() && points[i].0 == t {
                let (_, id, x, y, dims) = points[i].clone();
                ids.push(id);
                positions.push((x, y));
                dimensions.push(dims);
                i += 1;
            }
            frames.push(if embed {
                RawFrame::WithDimensions { timestamp: t, ids, positions, dimensions }
            } else {
                RawFrame::RequiresLookup { timestamp: t, ids, positions }
            });
        }
        debug!("derived {} frames from trajectories", frames.len());

        Ok(Self::new(frames, attributes, segments))
    }

    /// Rewind the frame cursor to the start of the stream
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl FrameSource for MemoryFrameSource {
    fn min_timestamp(&self) -> Result<f64, SourceError> {
        self.frames.first().map(RawFrame::timestamp).ok_or(SourceError::EmptyStore)
    }

    fn max_timestamp(&self) -> Result<f64, SourceError> {
        self.frames.last().map(RawFrame::timestamp).ok_or(SourceError::EmptyStore)
    }

    fn frame_at(&self, timestamp: f64) -> Result<Option<RawFrame>, SourceError> {
        let idx = self.frames.partition_point(|f| f.timestamp() < timestamp);
        Ok(self.frames.get(idx).cloned())
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>, SourceError> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn attributes_by_ids(
        &self,
        ids: &[VehicleId],
    ) -> Result<HashMap<VehicleId, VehicleAttributes>, SourceError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.attributes.get(id).map(|a| (id.clone(), *a)))
            .collect())
    }

    fn segments_entering(
        &self,
        from: f64,
        to: f64,
    ) -> Result<Vec<TrajectorySegment>, SourceError> {
        let lo = self.segments.partition_point(|s| s.first_timestamp < from);
        let hi = self.segments.partition_point(|s| s.first_timestamp < to);
        let mut out: Vec<TrajectorySegment> = self.segments[lo..hi].to_vec();
        // store query order: descending last_timestamp
        out.sort_by(|a, b| b.last_timestamp.total_cmp(&a.last_timestamp));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, ts: Vec<f64>, xs: Vec<f64>, ys: Vec<f64>) -> VehicleRecord {
        VehicleRecord {
            id: id.into(),
            length: 15.0,
            width: 6.0,
            coarse_vehicle_class: Some(1),
            timestamps: ts,
            x_positions: xs,
            y_positions: ys,
        }
    }

    fn two_vehicle_source(mode: &str) -> MemoryFrameSource {
        let dataset = Dataset {
            mode: Some(mode.to_string()),
            vehicles: vec![
                record("a", vec![1.0, 2.0, 3.0], vec![100.0, 110.0, 120.0], vec![6.0, 6.0, 6.0]),
                record("b", vec![2.0, 3.0, 4.0], vec![200.0, 210.0, 220.0], vec![18.0, 18.0, 18.0]),
            ],
        };
        MemoryFrameSource::from_dataset(dataset).unwrap()
    }

    /// Test: frames are derived grouped by timestamp
    /// Validates: the transformed-collection derivation and cursor order
    #[test]
    fn test_frames_grouped_by_timestamp() {
        let mut src = two_vehicle_source("raw");
        assert_eq!(src.min_timestamp().unwrap(), 1.0);
        assert_eq!(src.max_timestamp().unwrap(), 4.0);

        let f1 = src.next_frame().unwrap().unwrap();
        assert_eq!(f1.timestamp(), 1.0);
        let f2 = src.next_frame().unwrap().unwrap();
        match &f2 {
            RawFrame::WithDimensions { ids, positions, dimensions, .. } => {
                assert_eq!(ids.len(), 2);
                assert_eq!(positions.len(), 2);
                assert_eq!(dimensions.len(), 2);
            }
            other => panic!("expected embedded dimensions, got {:?}", other),
        }
        src.next_frame().unwrap().unwrap();
        src.next_frame().unwrap().unwrap();
        assert!(src.next_frame().unwrap().is_none());
        assert!(src.next_frame().unwrap().is_none()); // stays exhausted

        src.rewind();
        assert_eq!(src.next_frame().unwrap().unwrap().timestamp(), 1.0);
    }

    /// Test: reconciled mode requires lookup
    /// Validates: frames carry no dimensions, attributes resolve by id
    #[test]
    fn test_reconciled_mode_lookup() {
        let mut src = two_vehicle_source("reconciled");
        let f = src.next_frame().unwrap().unwrap();
        assert!(matches!(f, RawFrame::RequiresLookup { .. }));

        let attrs = src.attributes_by_ids(&["a".into(), "missing".into()]).unwrap();
        assert_eq!(attrs.len(), 1);
        let a = attrs.get(&VehicleId::from("a")).unwrap();
        assert_eq!(a.length, 15.0);
        assert_eq!(a.class, Some(1));
    }

    /// Test: segment range query
    /// Validates: half-open [from, to) on first_timestamp, descending
    /// last_timestamp order
    #[test]
    fn test_segments_entering_range() {
        let src = two_vehicle_source("raw");

        let segs = src.segments_entering(1.0, 2.0).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].id, VehicleId::from("a"));

        let segs = src.segments_entering(1.0, 2.5).unwrap();
        assert_eq!(segs.len(), 2);
        // b ends later, so it sorts first
        assert_eq!(segs[0].id, VehicleId::from("b"));

        let segs = src.segments_entering(2.0, 2.0).unwrap();
        assert!(segs.is_empty());
    }

    /// Test: frame_at returns the frame at-or-after the timestamp
    /// Validates: NOT_FOUND past the end, no cursor movement
    #[test]
    fn test_frame_at() {
        let mut src = two_vehicle_source("raw");
        assert_eq!(src.frame_at(2.5).unwrap().unwrap().timestamp(), 3.0);
        assert_eq!(src.frame_at(3.0).unwrap().unwrap().timestamp(), 3.0);
        assert!(src.frame_at(4.5).unwrap().is_none());
        // frame_at must not advance the cursor
        assert_eq!(src.next_frame().unwrap().unwrap().timestamp(), 1.0);
    }

    /// Test: empty store reports EmptyStore
    /// Validates: bounds queries fail cleanly rather than panic
    #[test]
    fn test_empty_store() {
        let src = MemoryFrameSource::new(Vec::new(), HashMap::new(), Vec::new());
        assert!(matches!(src.min_timestamp(), Err(SourceError::EmptyStore)));
        assert!(matches!(src.max_timestamp(), Err(SourceError::EmptyStore)));
    }

    /// Test: normalization resolves the sum type
    /// Validates: WithDimensions -> Some(dims), RequiresLookup -> None
    #[test]
    fn test_normalize() {
        let raw = RawFrame::WithDimensions {
            timestamp: 1.0,
            ids: vec!["a".into()],
            positions: vec![(0.0, 0.0)],
            dimensions: vec![Dimensions { length: 15.0, width: 6.0 }],
        };
        let frame = raw.normalize().unwrap();
        assert!(frame.dimensions.is_some());

        let raw = RawFrame::RequiresLookup {
            timestamp: 1.0,
            ids: vec!["a".into()],
            positions: vec![(0.0, 0.0)],
        };
        assert!(raw.normalize().unwrap().dimensions.is_none());
    }
}
