//! Lane geometry and binning for the time-space strips
//!
//! **Why**: Trajectory segments arrive as raw y-positions; the time-space
//! view wants them routed to one sub-view per lane. Binning is the classic
//! "digitize minus one" rule over ascending lane boundaries, with out-of-span
//! positions clamped instead of rejected (roadway geometry in real datasets
//! is noisy at the shoulders).
//!
//! **Used by**: PlaybackLoop (routing entering segments), pipeline consumer
//!
//! # Geometry
//!
//! The default roadway has 12 lanes at a 12-foot pitch, bounded by 13
//! ascending y values from -12 to 132. Lane names run eastbound right
//! shoulder to westbound right shoulder. `bin_index` is generic over any
//! ascending boundary slice: `N` boundaries define `N - 1` bins.

use crate::model::{ModelError, TrajectorySegment};

/// Lane names, eastbound first (index 0 = EB right shoulder)
pub const LANE_NAMES: [&str; 12] = [
    "EBRS", "EB4", "EB3", "EB2", "EB1", "EBLS", "WBLS", "WB1", "WB2", "WB3", "WB4", "WBRS",
];

/// Lane pitch in feet
pub const LANE_PITCH_FT: f64 = 12.0;

/// Default lane boundaries: -12, 0, 12, ... 132 (13 values, 12 lanes)
pub fn default_boundaries() -> Vec<f64> {
    (-1..12).map(|i| f64::from(i) * LANE_PITCH_FT).collect()
}

/// Map a y-position to a lane index using right-open bins:
/// the returned `i` satisfies `boundaries[i] <= y < boundaries[i + 1]`.
///
/// Positions outside the full span clamp to the first or last bin; the
/// result is always a valid index in `[0, boundaries.len() - 2]`. Boundaries
/// must be ascending; fewer than two boundaries degenerate to bin 0.
pub fn bin_index(y: f64, boundaries: &[f64]) -> usize {
    if boundaries.len() < 2 {
        return 0;
    }
    let bins = boundaries.len() - 1;
    // partition_point = count of boundaries <= y, i.e. numpy digitize(right=False)
    let crossed = boundaries.partition_point(|b| *b <= y);
    crossed.saturating_sub(1).min(bins - 1)
}

/// One contiguous run of segment points sharing a lane index
#[derive(Debug, Clone, PartialEq)]
pub struct LaneRun {
    pub lane: usize,
    pub timestamps: Vec<f64>,
    pub x_positions: Vec<f64>,
}

/// Split a segment into per-lane contiguous runs.
///
/// A segment that crosses a lane boundary mid-segment yields one run per
/// contiguous stretch, so a vehicle weaving between two lanes produces
/// alternating runs rather than one line per lane spanning the gap.
/// Malformed segments (mismatched arrays) are reported, not fatal; the
/// caller drops them and continues.
pub fn split_by_lane(
    segment: &TrajectorySegment,
    boundaries: &[f64],
) -> Result<Vec<LaneRun>, ModelError> {
    segment.validate()?;

    let mut runs: Vec<LaneRun> = Vec::new();
    for (i, &y) in segment.y_positions.iter().enumerate() {
        let lane = bin_index(y, boundaries);
        match runs.last_mut() {
            Some(run) if run.lane == lane => {
                run.timestamps.push(segment.timestamps[i]);
                run.x_positions.push(segment.x_positions[i]);
            }
            _ => runs.push(LaneRun {
                lane,
                timestamps: vec![segment.timestamps[i]],
                x_positions: vec![segment.x_positions[i]],
            }),
        }
    }
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrajectorySegment;

    fn seg(ts: Vec<f64>, xs: Vec<f64>, ys: Vec<f64>) -> TrajectorySegment {
        TrajectorySegment::new("v".into(), ts, xs, ys).unwrap()
    }

    /// Test: shoulder and first eastbound lane on the default geometry
    /// Validates: y=-6 maps to lane 0, y=6 maps to lane 1
    #[test]
    fn test_bin_index_scenario() {
        let b = default_boundaries();
        assert_eq!(bin_index(-6.0, &b), 0);
        assert_eq!(bin_index(6.0, &b), 1);
    }

    /// Test: binning totality over the full span
    /// Validates: every y in [first, last) maps to exactly one valid bin
    #[test]
    fn test_bin_index_totality() {
        let b = default_boundaries();
        let bins = b.len() - 1;
        let mut y = b[0];
        while y < b[bins] {
            let idx = bin_index(y, &b);
            assert!(idx < bins, "y={} gave out-of-range bin {}", y, idx);
            // right-open: boundaries[i] <= y < boundaries[i+1]
            assert!(b[idx] <= y && y < b[idx + 1], "y={} landed in bin {}", y, idx);
            y += 0.5;
        }
    }

    /// Test: bin edges are right-open
    /// Validates: a boundary value belongs to the bin it opens
    #[test]
    fn test_bin_index_right_open() {
        let b = default_boundaries();
        assert_eq!(bin_index(0.0, &b), 1);
        assert_eq!(bin_index(12.0, &b), 2);
        assert_eq!(bin_index(-12.0, &b), 0);
    }

    /// Test: out-of-span clamping
    /// Validates: values outside the span map to the first/last bin
    #[test]
    fn test_bin_index_clamps() {
        let b = default_boundaries();
        let bins = b.len() - 1;
        assert_eq!(bin_index(-1000.0, &b), 0);
        assert_eq!(bin_index(1000.0, &b), bins - 1);
        assert_eq!(bin_index(132.0, &b), bins - 1); // exactly at last boundary
    }

    /// Test: splitting a single-lane segment
    /// Validates: one run covering all points
    #[test]
    fn test_split_single_lane() {
        let b = default_boundaries();
        let s = seg(vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0], vec![6.0, 7.0, 8.0]);
        let runs = split_by_lane(&s, &b).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].lane, 1);
        assert_eq!(runs[0].timestamps, vec![1.0, 2.0, 3.0]);
    }

    /// Test: splitting across a mid-segment lane change
    /// Validates: contiguous runs per lane, weaving yields separate runs
    #[test]
    fn test_split_lane_crossing() {
        let b = default_boundaries();
        let s = seg(
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![10.0, 20.0, 30.0, 40.0, 50.0],
            vec![6.0, 6.0, 18.0, 18.0, 6.0],
        );
        let runs = split_by_lane(&s, &b).unwrap();
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].lane, 1);
        assert_eq!(runs[0].timestamps, vec![1.0, 2.0]);
        assert_eq!(runs[1].lane, 2);
        assert_eq!(runs[1].timestamps, vec![3.0, 4.0]);
        assert_eq!(runs[2].lane, 1);
        assert_eq!(runs[2].timestamps, vec![5.0]);
    }

    /// Test: malformed segment is an error, not a panic
    /// Validates: mismatched arrays are reported for the caller to drop
    #[test]
    fn test_split_malformed_segment() {
        let b = default_boundaries();
        let mut s = seg(vec![1.0, 2.0], vec![0.0, 0.0], vec![0.0, 0.0]);
        s.y_positions.pop();
        assert!(split_by_lane(&s, &b).is_err());
    }

    /// Test: lane name table matches geometry
    /// Validates: 12 names for 12 default bins
    #[test]
    fn test_lane_names_cover_bins() {
        assert_eq!(LANE_NAMES.len(), default_boundaries().len() - 1);
    }
}
