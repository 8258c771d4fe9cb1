//! Shot-boundary input for shot-mode planning.
//!
//! The core does not detect shots itself. A [`ShotDetector`] (or any other
//! source of cut data) produces [`ShotBoundaries`], which the planner turns
//! into one representative instant per shot.

use std::{ops::Range, time::Duration};

use thiserror::Error;

use crate::error::DecodeError;
use crate::source::VideoSource;

/// Default detector sensitivity, matching common content-detector
/// thresholds.
pub const DEFAULT_SHOT_SENSITIVITY: f64 = 27.0;

/// One shot as a half-open interval `[start, end)` of source time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShotBoundary {
    /// First instant of the shot.
    pub start: Duration,
    /// Instant the next shot begins.
    pub end: Duration,
}

impl ShotBoundary {
    /// Create a boundary. `end` must be after `start` for the shot to be
    /// usable; [`ShotBoundaries::new`] enforces that.
    pub fn new(start: Duration, end: Duration) -> Self {
        Self { start, end }
    }

    /// Length of the shot.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// Intersection with `range`, or `None` if they do not overlap.
    pub fn clip(&self, range: &Range<Duration>) -> Option<ShotBoundary> {
        let start = self.start.max(range.start);
        let end = self.end.min(range.end);
        (start < end).then_some(ShotBoundary { start, end })
    }
}

/// Why a list of boundaries was rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ShotBoundariesError {
    /// A shot ends at or before its start (0-based index of the shot).
    #[error("Shot {0} ends at or before its start")]
    EmptyShot(usize),
    /// A shot starts before the previous one ended (0-based index).
    #[error("Shot {0} overlaps the previous shot")]
    Overlap(usize),
}

/// Ordered, non-overlapping shots.
///
/// Validated at construction, so the planner can rely on strictly
/// increasing starts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShotBoundaries {
    shots: Vec<ShotBoundary>,
}

impl ShotBoundaries {
    /// Validate and wrap a list of shots.
    ///
    /// # Errors
    ///
    /// Fails if any shot is empty or starts before its predecessor ends.
    pub fn new(shots: Vec<ShotBoundary>) -> Result<Self, ShotBoundariesError> {
        for (index, shot) in shots.iter().enumerate() {
            if shot.end <= shot.start {
                return Err(ShotBoundariesError::EmptyShot(index));
            }
            if index > 0 && shot.start < shots[index - 1].end {
                return Err(ShotBoundariesError::Overlap(index));
            }
        }
        Ok(Self { shots })
    }

    /// Build covering shots from a list of cut instants.
    ///
    /// Cuts outside `range` are ignored and duplicates collapse. The first
    /// shot starts at `range.start` and the last ends at `range.end`.
    pub fn from_cuts(cuts: &[Duration], range: Range<Duration>) -> Self {
        let mut points: Vec<Duration> = cuts
            .iter()
            .copied()
            .filter(|cut| *cut > range.start && *cut < range.end)
            .collect();
        points.sort_unstable();
        points.dedup();

        let mut shots = Vec::with_capacity(points.len() + 1);
        let mut start = range.start;
        for cut in points {
            shots.push(ShotBoundary::new(start, cut));
            start = cut;
        }
        if start < range.end {
            shots.push(ShotBoundary::new(start, range.end));
        }
        Self { shots }
    }

    /// Shots in order.
    pub fn shots(&self) -> &[ShotBoundary] {
        &self.shots
    }

    /// Number of shots.
    pub fn len(&self) -> usize {
        self.shots.len()
    }

    /// Whether there are no shots.
    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    /// Shot containing `timestamp`, with its 0-based index.
    pub fn shot_at(&self, timestamp: Duration) -> Option<(usize, ShotBoundary)> {
        let index = self.shots.partition_point(|shot| shot.end <= timestamp);
        self.shots
            .get(index)
            .filter(|shot| shot.start <= timestamp)
            .map(|shot| (index, *shot))
    }
}

/// External scene-boundary detection capability.
///
/// Higher `sensitivity` thresholds yield fewer cuts.
pub trait ShotDetector: Send + Sync {
    /// Detect shots of `source` inside `range`.
    fn detect_shots(
        &self,
        source: &VideoSource,
        sensitivity: f64,
        range: Range<Duration>,
    ) -> Result<ShotBoundaries, DecodeError>;
}
