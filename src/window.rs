//! Rolling time-window controller for the time-space views
//!
//! **Why**: Re-querying the whole visible window every tick is wasteful. The
//! window controller advances a query cursor and exposes two predicates,
//! "entering" for segments that newly qualify since the last tick and
//! "evicted" for segments that scrolled out, so the playback loop fetches
//! and drops deltas only.
//!
//! **Used by**: PlaybackLoop (one advance per tick)
//!
//! # Modes
//!
//! Exactly one advance mode is active per session, fixed at construction:
//!
//! - **Anchored** (overhead-driven): the window is centered on an external
//!   anchor timestamp, usually the overhead frame's clock.
//! - **FixedIncrement** (time-space only): the right edge advances by
//!   `1 / framerate` per tick.
//!
//! # Termination
//!
//! Playback ends once the window midpoint reaches the global maximum
//! timestamp. That is an end-of-stream condition, signaled distinctly from
//! failure by the playback loop.

use log::warn;

/// Visible time range plus the pre-advance right edge.
///
/// Invariant: `left < right` and `right - left == window_size`, except for
/// `old_right` which holds the previous right edge during the single tick
/// that computes the delta query. Mutated exactly once per tick, single
/// writer, never shared across ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowState {
    pub left: f64,
    pub right: f64,
    pub old_right: f64,
    pub window_size: f64,
}

/// How the window advances each tick, selected at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdvanceMode {
    /// Center the window on an external anchor timestamp
    Anchored,
    /// Advance the right edge by `1 / framerate` per tick
    FixedIncrement { framerate: f64 },
}

/// State machine over [`WindowState`]
#[derive(Debug)]
pub struct WindowController {
    state: WindowState,
    mode: AdvanceMode,
    t_max: f64,
}

impl WindowController {
    /// Create a controller parked just before the stream: `right` starts at
    /// `t_min`, so the first advance's entering query begins at `t_min` and
    /// successive queries tile the timeline with no gap.
    pub fn new(t_min: f64, t_max: f64, window_size: f64, mode: AdvanceMode) -> Self {
        Self {
            state: WindowState {
                left: t_min - window_size,
                right: t_min,
                old_right: t_min,
                window_size,
            },
            mode,
            t_max,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn mode(&self) -> AdvanceMode {
        self.mode
    }

    /// End-of-stream check: the window midpoint has reached the global max.
    pub fn is_exhausted(&self) -> bool {
        (self.state.left + self.state.right) / 2.0 >= self.t_max
    }

    /// Roll the window forward. `anchor` is required in anchored mode and
    /// ignored in fixed-increment mode; an anchored advance without an
    /// anchor holds the window in place (empty entering range) rather than
    /// guessing.
    pub fn advance(&mut self, anchor: Option<f64>) {
        self.state.old_right = self.state.right;
        match (self.mode, anchor) {
            (AdvanceMode::Anchored, Some(t)) => {
                self.state.right = t + self.state.window_size / 2.0;
                self.state.left = t - self.state.window_size / 2.0;
            }
            (AdvanceMode::Anchored, None) => {
                warn!("anchored advance without anchor, window held");
            }
            (AdvanceMode::FixedIncrement { framerate }, _) => {
                self.state.right += 1.0 / framerate;
                self.state.left = self.state.right - self.state.window_size;
            }
        }
    }

    /// Half-open range `[old_right, right)` of first-timestamps that newly
    /// qualify since the last tick.
    pub fn entering_range(&self) -> (f64, f64) {
        (self.state.old_right, self.state.right)
    }

    /// Entering predicate on a segment's first timestamp.
    pub fn is_entering(&self, first_timestamp: f64) -> bool {
        first_timestamp >= self.state.old_right && first_timestamp < self.state.right
    }

    /// Eviction predicate on a segment's last timestamp, against the
    /// current (post-advance) left edge.
    pub fn is_evicted(&self, last_timestamp: f64) -> bool {
        last_timestamp < self.state.left
    }
}
