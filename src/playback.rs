//! Playback loop: one tick per call, from frame fetch to render model
//!
//! **Why**: Every view script used to reimplement the same tick: fetch a
//! frame, resolve attributes and colors through the caches, roll the window,
//! swap entering segments for evicted ones, emit drawables. This module is
//! that tick, once, behind a renderer-agnostic seam.
//!
//! **Used by**: main (playback driver), tests
//!
//! # Tick model
//!
//! One `tick()` is one atomic unit of work, invoked by an external scheduler
//! at the configured framerate. Ticks never overlap; all cache and window
//! mutations are single-writer, so nothing here locks.
//!
//! # Failure posture
//!
//! A failed tick is logged with its timestamp context and reported as
//! `Recovered`; the loop stays usable and the next tick proceeds. Only
//! `EndOfStream` (window exhausted or cursor drained) stops playback, and it
//! is an expected outcome, not an error.

use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::cache::BoundedAttributeCache;
use crate::config::Config;
use crate::lanes::split_by_lane;
use crate::model::{
    BoxGlyph, DisplayColor, LaneLine, ModelError, RenderModel, VehicleAttributes, VehicleFrame,
    VehicleId,
};
use crate::source::{FrameSource, SourceError};
use crate::window::{AdvanceMode, WindowController, WindowState};

use std::fmt;

/// Whether the loop advances on tick or holds the last model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Running,
    Paused,
}

/// Per-tick errors the loop recovers from
#[derive(Debug)]
pub enum PlaybackError {
    Source(SourceError),
    Model(ModelError),
}

impl fmt::Display for PlaybackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackError::Source(e) => write!(f, "source error: {}", e),
            PlaybackError::Model(e) => write!(f, "model error: {}", e),
        }
    }
}

impl std::error::Error for PlaybackError {}

impl From<SourceError> for PlaybackError {
    fn from(e: SourceError) -> Self {
        PlaybackError::Source(e)
    }
}

impl From<ModelError> for PlaybackError {
    fn from(e: ModelError) -> Self {
        PlaybackError::Model(e)
    }
}

/// Result of one tick. `Recovered` means the tick was skipped after an
/// internal error; the loop remains usable.
#[derive(Debug)]
pub enum TickOutcome {
    Continue(RenderModel),
    EndOfStream,
    Recovered(PlaybackError),
}

/// The playback engine: window controller plus the two bounded caches,
/// driven once per animation tick.
pub struct PlaybackLoop<S: FrameSource> {
    source: S,
    window: WindowController,
    attributes: BoundedAttributeCache<VehicleId, VehicleAttributes>,
    colors: BoundedAttributeCache<VehicleId, DisplayColor>,
    /// Drawable lines currently inside the window, evicted as they scroll out
    lines: Vec<LaneLine>,
    config: Config,
    state: PlaybackState,
    last_model: RenderModel,
    ticks: u64,
    rng: StdRng,
}

impl<S: FrameSource> PlaybackLoop<S> {
    /// Build the loop from the source's global time bounds. Fails only if
    /// the store is unreadable or empty; per-tick errors are recovered later.
    pub fn new(source: S, config: Config) -> Result<Self, PlaybackError> {
        let t_min = source.min_timestamp()?;
        let t_max = match config.duration {
            Some(d) => t_min + d,
            None => source.max_timestamp()?,
        };
        let mode = if config.overhead_view {
            AdvanceMode::Anchored
        } else {
            AdvanceMode::FixedIncrement { framerate: config.framerate }
        };
        let window = WindowController::new(t_min, t_max, config.window_size, mode);
        info!(
            "playback: t=[{:.3}, {:.3}], window {}s, mode {:?}",
            t_min, t_max, config.window_size, mode
        );

        Ok(Self {
            source,
            window,
            attributes: BoundedAttributeCache::new(config.cache_capacity),
            colors: BoundedAttributeCache::new(config.cache_capacity),
            lines: Vec::new(),
            config,
            state: PlaybackState::Running,
            last_model: RenderModel::default(),
            ticks: 0,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Paused {
            self.state = PlaybackState::Paused;
            info!("playback paused at tick {}", self.ticks);
        }
    }

    pub fn resume(&mut self) {
        if self.state != PlaybackState::Running {
            self.state = PlaybackState::Running;
            info!("playback resumed at tick {}", self.ticks);
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn window(&self) -> WindowState {
        self.window.state()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// (attribute entries, color entries) currently cached
    pub fn cache_sizes(&self) -> (usize, usize) {
        (self.attributes.len(), self.colors.len())
    }

    /// Last emitted render model (re-served while paused, and the answer to
    /// a renderer's re-render request)
    pub fn last_model(&self) -> &RenderModel {
        &self.last_model
    }

    /// Run one tick. While paused, re-serves the last model without
    /// advancing anything.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state == PlaybackState::Paused {
            return TickOutcome::Continue(self.last_model.clone());
        }
        match self.run_tick() {
            Ok(Some(model)) => {
                self.ticks += 1;
                self.last_model = model.clone();
                TickOutcome::Continue(model)
            }
            Ok(None) => {
                info!("end of stream after {} ticks", self.ticks);
                TickOutcome::EndOfStream
            }
            Err(e) => {
                let s = self.window.state();
                warn!(
                    "tick {} skipped (window right {:.3}): {}",
                    self.ticks, s.right, e
                );
                TickOutcome::Recovered(e)
            }
        }
    }

    fn run_tick(&mut self) -> Result<Option<RenderModel>, PlaybackError> {
        if self.window.is_exhausted() {
            return Ok(None);
        }

        // 1-3: frame fetch + attribute/color resolution (overhead mode only)
        let mut anchor = None;
        let mut boxes = Vec::new();
        if self.config.overhead_view {
            let Some(raw) = self.source.next_frame()? else {
                return Ok(None);
            };
            let frame = raw.normalize()?;
            anchor = Some(frame.timestamp);
            self.resolve_attributes(&frame)?;
            boxes = self.build_boxes(&frame);
        }

        // 4: roll the window, fetch entering segments, evict stale lines
        self.window.advance(anchor);
        let (from, to) = self.window.entering_range();
        let entering = self.source.segments_entering(from, to)?;

        // 5: bin entering segments into per-lane contiguous runs
        for seg in &entering {
            match split_by_lane(seg, &self.config.lane_boundaries) {
                Ok(runs) => {
                    let color = self.color_for(&seg.id);
                    for run in runs {
                        self.lines.push(LaneLine {
                            id: seg.id.clone(),
                            lane: run.lane,
                            timestamps: run.timestamps,
                            x_positions: run.x_positions,
                            color,
                        });
                    }
                }
                Err(e) => warn!("dropping segment: {}", e),
            }
        }

        let left = self.window.state().left;
        self.lines.retain(|line| !self.window.is_evicted(line.last_timestamp()));
        debug!(
            "tick {}: +{} entering, {} lines live, left {:.3}",
            self.ticks,
            entering.len(),
            self.lines.len(),
            left
        );

        // 6: emit the render model
        let s = self.window.state();
        let clock = anchor.unwrap_or((s.left + s.right) / 2.0);
        Ok(Some(RenderModel {
            clock,
            window: (s.left, s.right),
            boxes,
            lines: self.lines.clone(),
        }))
    }

    /// Resolve attributes for every id in the frame: prefer embedded
    /// dimensions, otherwise batch-fetch exactly the missing ids.
    fn resolve_attributes(&mut self, frame: &VehicleFrame) -> Result<(), PlaybackError> {
        match &frame.dimensions {
            Some(dims) => {
                for (id, d) in frame.ids.iter().zip(dims) {
                    self.attributes.put(
                        id.clone(),
                        VehicleAttributes { length: d.length, width: d.width, class: None },
                    );
                }
            }
            None => {
                let missing: Vec<VehicleId> = frame
                    .ids
                    .iter()
                    .filter(|id| {
                        // a hit also refreshes recency for vehicles still on screen
                        self.attributes.get(id).is_none()
                    })
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    let fetched = self.source.attributes_by_ids(&missing)?;
                    for (id, attrs) in fetched {
                        self.attributes.put(id, attrs);
                    }
                }
            }
        }
        Ok(())
    }

    /// Sticky color per id: first roll wins for as long as the id stays in
    /// the cache; an evicted id re-rolls on re-entry.
    fn color_for(&mut self, id: &VehicleId) -> DisplayColor {
        if let Some(c) = self.colors.get(id) {
            return *c;
        }
        let c = DisplayColor::random(&mut self.rng);
        self.colors.put(id.clone(), c);
        c
    }

    fn build_boxes(&mut self, frame: &VehicleFrame) -> Vec<BoxGlyph> {
        let mut boxes = Vec::with_capacity(frame.len());
        let span = (
            self.config.lane_boundaries[0],
            self.config.lane_boundaries[self.config.lane_boundaries.len() - 1],
        );
        for (i, id) in frame.ids.iter().enumerate() {
            let (x, y) = frame.positions[i];
            if x < self.config.x_min || x > self.config.x_max {
                continue;
            }
            if y < span.0 || y >= span.1 {
                debug!("vehicle {} off the road at ({:.1}, {:.1})", id, x, y);
            }
            let Some(attrs) = self.attributes.get(id).copied() else {
                // MissingAttribute: skip this vehicle's box for the tick
                debug!("no attributes for {} at t={:.3}, box skipped", id, frame.timestamp);
                continue;
            };
            let color = self.color_for(id);
            boxes.push(BoxGlyph {
                id: id.clone(),
                x,
                y,
                length: attrs.length,
                width: attrs.width,
                color,
            });
        }
        boxes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrajectorySegment;
    use crate::source::{Dataset, MemoryFrameSource, RawFrame, VehicleRecord};
    use std::collections::HashMap;

    fn record(id: &str, t0: f64, n: usize, x0: f64, y: f64) -> VehicleRecord {
        let timestamps: Vec<f64> = (0..n).map(|i| t0 + i as f64 * 0.04).collect();
        let x_positions: Vec<f64> = (0..n).map(|i| x0 + i as f64).collect();
        let y_positions = vec![y; n];
        VehicleRecord {
            id: id.into(),
            length: 15.0,
            width: 6.0,
            coarse_vehicle_class: Some(1),
            timestamps,
            x_positions,
            y_positions,
        }
    }

    fn source(mode: &str) -> MemoryFrameSource {
        MemoryFrameSource::from_dataset(Dataset {
            mode: Some(mode.to_string()),
            vehicles: vec![
                record("a", 1000.0, 50, 1100.0, 6.0),
                record("b", 1000.0, 50, 1200.0, 18.0),
            ],
        })
        .unwrap()
    }

    fn config() -> Config {
        Config { x_min: 1000.0, x_max: 2000.0, ..Config::default() }
    }

    /// Test: a tick emits boxes and lines
    /// Validates: steps 1-6 of the tick against the raw-mode store
    #[test]
    fn test_tick_emits_render_model() {
        let mut pb = PlaybackLoop::new(source("raw"), config()).unwrap();
        match pb.tick() {
            TickOutcome::Continue(model) => {
                assert_eq!(model.boxes.len(), 2);
                // both segments start at t_min, inside [old_right, right)
                assert_eq!(model.lines.len(), 2);
                assert_eq!(model.clock, 1000.0);
                let (l, r) = model.window;
                assert!((r - l - 10.0).abs() < 1e-9);
            }
            other => panic!("expected Continue, got {:?}", other),
        }
        assert_eq!(pb.ticks(), 1);
    }

    /// Test: reconciled mode resolves attributes by batch lookup
    /// Validates: missing-id batch fetch path and cache fill
    #[test]
    fn test_tick_lookup_attributes() {
        let mut pb = PlaybackLoop::new(source("reconciled"), config()).unwrap();
        match pb.tick() {
            TickOutcome::Continue(model) => {
                assert_eq!(model.boxes.len(), 2);
                assert_eq!(model.boxes[0].length, 15.0);
            }
            other => panic!("expected Continue, got {:?}", other),
        }
        let (attrs, colors) = pb.cache_sizes();
        assert_eq!(attrs, 2);
        assert_eq!(colors, 2);
    }

    /// Test: an id with no resolvable attributes is skipped, not fatal
    /// Validates: MissingAttribute recovery
    #[test]
    fn test_missing_attributes_skips_box() {
        // frame mentions "ghost" but the store has no attributes for it
        let frames = vec![RawFrame::RequiresLookup {
            timestamp: 1000.0,
            ids: vec!["ghost".into()],
            positions: vec![(1500.0, 6.0)],
        }];
        let src = MemoryFrameSource::new(frames, HashMap::new(), Vec::new());
        let mut pb = PlaybackLoop::new(src, config()).unwrap();
        match pb.tick() {
            TickOutcome::Continue(model) => assert!(model.boxes.is_empty()),
            other => panic!("expected Continue, got {:?}", other),
        }
    }

    /// Test: x-range filter
    /// Validates: vehicles outside [x_min, x_max] get no box
    #[test]
    fn test_x_range_filter() {
        let mut cfg = config();
        cfg.x_min = 1150.0; // excludes vehicle "a" at x=1100
        let mut pb = PlaybackLoop::new(source("raw"), cfg).unwrap();
        match pb.tick() {
            TickOutcome::Continue(model) => {
                assert_eq!(model.boxes.len(), 1);
                assert_eq!(model.boxes[0].id, VehicleId::from("b"));
            }
            other => panic!("expected Continue, got {:?}", other),
        }
    }

    /// Test: colors are sticky across ticks
    /// Validates: insert-only color cache keeps the first roll
    #[test]
    fn test_color_stability() {
        let mut pb = PlaybackLoop::new(source("raw"), config()).unwrap();
        let first = match pb.tick() {
            TickOutcome::Continue(m) => m.boxes[0].color,
            other => panic!("expected Continue, got {:?}", other),
        };
        let second = match pb.tick() {
            TickOutcome::Continue(m) => m.boxes[0].color,
            other => panic!("expected Continue, got {:?}", other),
        };
        assert_eq!(first, second);
    }

    /// Test: cursor exhaustion ends the stream cleanly
    /// Validates: EndOfStream is an outcome, not an error
    #[test]
    fn test_end_of_stream() {
        let mut pb = PlaybackLoop::new(source("raw"), config()).unwrap();
        let mut saw_end = false;
        for _ in 0..200 {
            match pb.tick() {
                TickOutcome::Continue(_) => {}
                TickOutcome::EndOfStream => {
                    saw_end = true;
                    break;
                }
                TickOutcome::Recovered(e) => panic!("unexpected recovery: {}", e),
            }
        }
        assert!(saw_end, "stream never ended");
    }

    /// Test: duration clamps the global max
    /// Validates: window exhaustion from t_min + duration
    #[test]
    fn test_duration_clamp() {
        let mut cfg = config();
        cfg.duration = Some(0.5);
        let mut pb = PlaybackLoop::new(source("raw"), cfg).unwrap();
        let mut ticks = 0;
        loop {
            match pb.tick() {
                TickOutcome::Continue(_) => ticks += 1,
                TickOutcome::EndOfStream => break,
                TickOutcome::Recovered(e) => panic!("unexpected recovery: {}", e),
            }
            assert!(ticks < 100, "duration clamp ignored");
        }
        // 0.04s per frame, 0.5s duration: well under the full 50 frames
        assert!(ticks < 20, "ran {} ticks", ticks);
    }

    /// Test: pause holds the model, resume advances again
    /// Validates: explicit PlaybackState instead of callback flags
    #[test]
    fn test_pause_resume() {
        let mut pb = PlaybackLoop::new(source("raw"), config()).unwrap();
        let TickOutcome::Continue(first) = pb.tick() else {
            panic!("expected Continue");
        };
        pb.pause();
        assert_eq!(pb.state(), PlaybackState::Paused);
        let TickOutcome::Continue(held) = pb.tick() else {
            panic!("expected Continue");
        };
        assert_eq!(held, first);
        assert_eq!(pb.ticks(), 1);

        pb.resume();
        let TickOutcome::Continue(next) = pb.tick() else {
            panic!("expected Continue");
        };
        assert!(next.clock > first.clock);
        assert_eq!(pb.ticks(), 2);
    }

    /// Test: lines scroll out of the window
    /// Validates: eviction predicate against the post-advance left edge
    #[test]
    fn test_line_eviction() {
        // short early segment, long later one; small window so the early
        // segment scrolls out while the stream is still running
        let early = TrajectorySegment::new(
            "early".into(),
            vec![1000.0, 1000.1],
            vec![1100.0, 1101.0],
            vec![6.0, 6.0],
        )
        .unwrap();
        let frames: Vec<RawFrame> = (0..100)
            .map(|i| RawFrame::WithDimensions {
                timestamp: 1000.0 + i as f64 * 0.04,
                ids: vec!["early".into()],
                positions: vec![(1100.0, 6.0)],
                dimensions: vec![crate::model::Dimensions { length: 15.0, width: 6.0 }],
            })
            .collect();
        let src = MemoryFrameSource::new(frames, HashMap::new(), vec![early]);
        let mut cfg = config();
        cfg.window_size = 1.0;
        let mut pb = PlaybackLoop::new(src, cfg).unwrap();

        let TickOutcome::Continue(first) = pb.tick() else {
            panic!("expected Continue");
        };
        assert_eq!(first.lines.len(), 1);

        // advance until the segment's last timestamp falls left of the window
        let mut evicted = false;
        for _ in 0..50 {
            match pb.tick() {
                TickOutcome::Continue(m) => {
                    if m.lines.is_empty() {
                        evicted = true;
                        break;
                    }
                }
                TickOutcome::EndOfStream => break,
                TickOutcome::Recovered(e) => panic!("unexpected recovery: {}", e),
            }
        }
        assert!(evicted, "early segment never evicted");
    }

    /// Test: a malformed segment is dropped with the tick continuing
    /// Validates: MalformedSegment recovery
    #[test]
    fn test_malformed_segment_dropped() {
        let mut bad = TrajectorySegment::new(
            "bad".into(),
            vec![1000.0, 1000.1],
            vec![1100.0, 1101.0],
            vec![6.0, 6.0],
        )
        .unwrap();
        bad.y_positions.pop(); // breaks the parallel-array invariant
        let frames = vec![RawFrame::WithDimensions {
            timestamp: 1000.0,
            ids: vec!["bad".into()],
            positions: vec![(1100.0, 6.0)],
            dimensions: vec![crate::model::Dimensions { length: 15.0, width: 6.0 }],
        }];
        let src = MemoryFrameSource::new(frames, HashMap::new(), vec![bad]);
        let mut pb = PlaybackLoop::new(src, config()).unwrap();
        match pb.tick() {
            TickOutcome::Continue(model) => {
                assert!(model.lines.is_empty());
                assert_eq!(model.boxes.len(), 1);
            }
            other => panic!("expected Continue, got {:?}", other),
        }
    }
}
