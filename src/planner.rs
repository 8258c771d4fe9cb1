//! Extraction planning.
//!
//! [`plan`] turns an [`ExtractionPlan`] into the ordered list of instants to
//! decode. It is a pure function: the same source and plan always produce
//! the same instants.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use movieprint::{ExtractionPlan, IntervalStep, ProbeInfo, VideoSource, plan};
//!
//! let source = VideoSource::from_probe(
//!     "clip.mp4",
//!     ProbeInfo {
//!         duration: Duration::from_secs(30),
//!         frames_per_second: 25.0,
//!         width: 1920,
//!         height: 1080,
//!         dynamic_range: Default::default(),
//!         hardware_decode_available: false,
//!         codec: "h264".into(),
//!     },
//! );
//! let extraction_plan = ExtractionPlan::interval(IntervalStep::Seconds(Duration::from_secs(5)))
//!     .with_range(Duration::ZERO, Some(Duration::from_secs(10)));
//!
//! let instants = plan(&extraction_plan, &source, None)?;
//! let timestamps: Vec<_> = instants.iter().map(|instant| instant.timestamp).collect();
//! assert_eq!(timestamps, vec![Duration::ZERO, Duration::from_secs(5)]);
//! # Ok::<(), movieprint::PlanningError>(())
//! ```

use std::{collections::BTreeSet, ops::Range, time::Duration};

use crate::conversion::{frame_number_to_timestamp, timestamp_to_frame_number};
use crate::error::PlanningError;
use crate::shots::{DEFAULT_SHOT_SENSITIVITY, ShotBoundaries, ShotBoundary};
use crate::source::VideoSource;

/// Distance between interval samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalStep {
    /// Fixed wall-clock step.
    Seconds(Duration),
    /// Fixed number of source frames.
    Frames(u64),
}

impl IntervalStep {
    /// Pick the step from loosely-typed inputs. Seconds win when both are
    /// given.
    ///
    /// # Errors
    ///
    /// [`PlanningError::MissingInterval`] when neither is given,
    /// [`PlanningError::InvalidInterval`] for zero, negative, non-finite or
    /// out-of-range values.
    pub fn from_options(seconds: Option<f64>, frames: Option<u64>) -> Result<Self, PlanningError> {
        match (seconds, frames) {
            (Some(seconds), _) => {
                if seconds <= 0.0 {
                    return Err(PlanningError::InvalidInterval);
                }
                Duration::try_from_secs_f64(seconds)
                    .map(IntervalStep::Seconds)
                    .map_err(|_| PlanningError::InvalidInterval)
            }
            (None, Some(0)) => Err(PlanningError::InvalidInterval),
            (None, Some(frames)) => Ok(IntervalStep::Frames(frames)),
            (None, None) => Err(PlanningError::MissingInterval),
        }
    }
}

/// How a shot's representative instant is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShotInstantPolicy {
    /// Always the first instant of the shot.
    Start,
    /// Always the midpoint of the shot.
    Midpoint,
    /// The midpoint, or the start when the (clipped) shot is shorter than
    /// `min_duration`.
    MidpointUnlessShort {
        /// Shots shorter than this use their start.
        min_duration: Duration,
    },
}

impl Default for ShotInstantPolicy {
    fn default() -> Self {
        ShotInstantPolicy::MidpointUnlessShort {
            min_duration: Duration::from_millis(500),
        }
    }
}

impl ShotInstantPolicy {
    /// Representative instant of `shot`; always inside `[start, end)` for a
    /// non-empty shot.
    pub fn instant_for(self, shot: &ShotBoundary) -> Duration {
        let midpoint = shot.start + shot.duration() / 2;
        match self {
            ShotInstantPolicy::Start => shot.start,
            ShotInstantPolicy::Midpoint => midpoint,
            ShotInstantPolicy::MidpointUnlessShort { min_duration } => {
                if shot.duration() < min_duration {
                    shot.start
                } else {
                    midpoint
                }
            }
        }
    }
}

/// Sampling strategy plus mode-specific settings.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionMode {
    /// Sample at fixed steps.
    Interval {
        /// Step between samples.
        step: IntervalStep,
        /// Frame indices (`round(t × fps)`) that must not be sampled.
        excluded_frames: BTreeSet<u64>,
    },
    /// One sample per detected shot.
    Shot {
        /// Sensitivity handed to the shot detector.
        sensitivity: f64,
        /// 1-based shot numbers to skip.
        excluded_shots: BTreeSet<usize>,
        /// Representative-instant rule.
        instant_policy: ShotInstantPolicy,
    },
}

/// What to sample. Immutable once built; replace it to change the print.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct ExtractionPlan {
    /// Sampling strategy.
    pub mode: ExtractionMode,
    /// Inclusive start of the sampled range.
    pub start: Duration,
    /// Exclusive end; `None` means the end of the source.
    pub end: Option<Duration>,
    /// Downsample evenly to at most this many frames.
    pub max_frames: Option<usize>,
}

impl ExtractionPlan {
    /// Interval-mode plan over the whole source.
    pub fn interval(step: IntervalStep) -> Self {
        Self {
            mode: ExtractionMode::Interval {
                step,
                excluded_frames: BTreeSet::new(),
            },
            start: Duration::ZERO,
            end: None,
            max_frames: None,
        }
    }

    /// Shot-mode plan over the whole source with default sensitivity and
    /// instant policy.
    pub fn shots() -> Self {
        Self {
            mode: ExtractionMode::Shot {
                sensitivity: DEFAULT_SHOT_SENSITIVITY,
                excluded_shots: BTreeSet::new(),
                instant_policy: ShotInstantPolicy::default(),
            },
            start: Duration::ZERO,
            end: None,
            max_frames: None,
        }
    }

    /// Restrict sampling to `[start, end)`.
    pub fn with_range(mut self, start: Duration, end: Option<Duration>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Cap the number of frames. `0` removes the cap.
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = (max_frames > 0).then_some(max_frames);
        self
    }

    /// Exclude frame indices (interval mode only; ignored otherwise).
    pub fn with_excluded_frames<I: IntoIterator<Item = u64>>(mut self, frames: I) -> Self {
        if let ExtractionMode::Interval {
            excluded_frames, ..
        } = &mut self.mode
        {
            excluded_frames.extend(frames);
        }
        self
    }

    /// Exclude 1-based shot numbers (shot mode only; ignored otherwise).
    pub fn with_excluded_shots<I: IntoIterator<Item = usize>>(mut self, shots: I) -> Self {
        if let ExtractionMode::Shot { excluded_shots, .. } = &mut self.mode {
            excluded_shots.extend(shots);
        }
        self
    }

    /// Set the shot detector sensitivity (shot mode only).
    pub fn with_sensitivity(mut self, value: f64) -> Self {
        if let ExtractionMode::Shot { sensitivity, .. } = &mut self.mode {
            *sensitivity = value;
        }
        self
    }

    /// Set the representative-instant rule (shot mode only).
    pub fn with_instant_policy(mut self, policy: ShotInstantPolicy) -> Self {
        if let ExtractionMode::Shot { instant_policy, .. } = &mut self.mode {
            *instant_policy = policy;
        }
        self
    }

    /// Whether this plan samples per shot.
    pub fn is_shot_mode(&self) -> bool {
        matches!(self.mode, ExtractionMode::Shot { .. })
    }

    /// Resolve `[start, end)` against the source duration.
    ///
    /// # Errors
    ///
    /// [`PlanningError::InvalidRange`] if the resolved range is empty.
    pub fn effective_range(&self, source: &VideoSource) -> Result<Range<Duration>, PlanningError> {
        let duration = source.duration();
        let end = self.end.map_or(duration, |end| end.min(duration));
        if end <= self.start {
            return Err(PlanningError::InvalidRange {
                start: self.start,
                end,
            });
        }
        Ok(self.start..end)
    }
}

/// The shot a planned instant represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShotSpan {
    /// 1-based shot number in the boundary list.
    pub number: usize,
    /// Start of the shot, clipped to the plan range.
    pub start: Duration,
    /// End of the shot, clipped to the plan range.
    pub end: Duration,
}

impl ShotSpan {
    /// Length of the clipped shot.
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// One instant to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlannedInstant {
    /// Position in the print; the join key with layout slots.
    pub sequence_index: usize,
    /// Source time to decode.
    pub timestamp: Duration,
    /// `round(timestamp × fps)`.
    pub frame_number: u64,
    /// Shot this instant represents (shot mode only).
    pub shot: Option<ShotSpan>,
}

/// Compute the instants to sample.
///
/// Instants are strictly increasing and inside the resolved range. Shot
/// mode needs `shots`.
///
/// # Errors
///
/// Returns a [`PlanningError`] for an empty range, a zero or unusable
/// interval, missing shot data, or an empty result.
pub fn plan(
    extraction_plan: &ExtractionPlan,
    source: &VideoSource,
    shots: Option<&ShotBoundaries>,
) -> Result<Vec<PlannedInstant>, PlanningError> {
    let range = extraction_plan.effective_range(source)?;
    let frames_per_second = source.frames_per_second();

    log::debug!(
        "Planning {} over {:?}..{:?}",
        if extraction_plan.is_shot_mode() {
            "shot mode"
        } else {
            "interval mode"
        },
        range.start,
        range.end
    );

    let instants = match &extraction_plan.mode {
        ExtractionMode::Interval {
            step,
            excluded_frames,
        } => plan_interval(*step, excluded_frames, &range, frames_per_second)?,
        ExtractionMode::Shot {
            excluded_shots,
            instant_policy,
            ..
        } => {
            let shots = shots.ok_or(PlanningError::MissingShotBoundaries)?;
            plan_shots(
                shots,
                excluded_shots,
                *instant_policy,
                &range,
                frames_per_second,
            )
        }
    };

    let mut instants = match extraction_plan.max_frames {
        Some(limit) if instants.len() > limit => downsample(instants, limit),
        _ => instants,
    };

    if instants.is_empty() {
        return Err(PlanningError::EmptyPlan);
    }

    for (sequence_index, instant) in instants.iter_mut().enumerate() {
        instant.sequence_index = sequence_index;
    }
    log::debug!("Planned {} instants", instants.len());
    Ok(instants)
}

fn plan_interval(
    step: IntervalStep,
    excluded_frames: &BTreeSet<u64>,
    range: &Range<Duration>,
    frames_per_second: f64,
) -> Result<Vec<PlannedInstant>, PlanningError> {
    let mut instants = Vec::new();
    let mut push = |timestamp: Duration, frame_number: u64| {
        if !excluded_frames.contains(&frame_number) {
            instants.push(PlannedInstant {
                sequence_index: 0,
                timestamp,
                frame_number,
                shot: None,
            });
        }
    };

    match step {
        IntervalStep::Seconds(step) => {
            if step.is_zero() {
                return Err(PlanningError::InvalidInterval);
            }
            let mut index: u32 = 0;
            loop {
                let Some(offset) = step.checked_mul(index) else {
                    break;
                };
                let timestamp = range.start + offset;
                if timestamp >= range.end {
                    break;
                }
                push(
                    timestamp,
                    timestamp_to_frame_number(timestamp, frames_per_second),
                );
                index += 1;
            }
        }
        IntervalStep::Frames(frames) => {
            if frames == 0 {
                return Err(PlanningError::InvalidInterval);
            }
            if frames_per_second <= 0.0 {
                return Err(PlanningError::UnknownFrameRate);
            }
            // Walk the frame grid directly so steps never accumulate error.
            let mut frame_number =
                (range.start.as_secs_f64() * frames_per_second - 1e-9).ceil().max(0.0) as u64;
            loop {
                let timestamp =
                    frame_number_to_timestamp(frame_number, frames_per_second).max(range.start);
                if timestamp >= range.end {
                    break;
                }
                push(timestamp, frame_number);
                frame_number += frames;
            }
        }
    }

    Ok(instants)
}

fn plan_shots(
    shots: &ShotBoundaries,
    excluded_shots: &BTreeSet<usize>,
    policy: ShotInstantPolicy,
    range: &Range<Duration>,
    frames_per_second: f64,
) -> Vec<PlannedInstant> {
    for &excluded in excluded_shots {
        if excluded == 0 || excluded > shots.len() {
            log::warn!(
                "Ignoring shot exclusion {excluded}: only shots 1..={} exist",
                shots.len()
            );
        }
    }

    shots
        .shots()
        .iter()
        .enumerate()
        .filter(|(index, _)| !excluded_shots.contains(&(index + 1)))
        .filter_map(|(index, shot)| shot.clip(range).map(|clipped| (index + 1, clipped)))
        .map(|(number, clipped)| {
            let timestamp = policy.instant_for(&clipped);
            PlannedInstant {
                sequence_index: 0,
                timestamp,
                frame_number: timestamp_to_frame_number(timestamp, frames_per_second),
                shot: Some(ShotSpan {
                    number,
                    start: clipped.start,
                    end: clipped.end,
                }),
            }
        })
        .collect()
}

/// Evenly spaced subset keeping the first and last instants.
fn downsample(instants: Vec<PlannedInstant>, limit: usize) -> Vec<PlannedInstant> {
    let count = instants.len();
    if limit == 1 {
        return instants.into_iter().take(1).collect();
    }
    let selected: BTreeSet<usize> = (0..limit)
        .map(|index| index * (count - 1) / (limit - 1))
        .collect();
    instants
        .into_iter()
        .enumerate()
        .filter(|(index, _)| selected.contains(index))
        .map(|(_, instant)| instant)
        .collect()
}
