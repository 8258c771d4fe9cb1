//! Planning integration tests.
//!
//! Planning is pure, so every test runs against a synthetic 60 s, 24 fps
//! source without touching a decoder.

mod common;

use std::time::Duration;

use common::{SyntheticDecoder, millis, secs};
use movieprint::{
    ExtractionPlan, IntervalStep, PlanningError, ShotBoundaries, ShotBoundary, ShotInstantPolicy,
    plan,
};

fn timestamps(extraction_plan: &ExtractionPlan, shots: Option<&ShotBoundaries>) -> Vec<Duration> {
    let source = SyntheticDecoder::new().source();
    plan(extraction_plan, &source, shots)
        .unwrap()
        .into_iter()
        .map(|instant| instant.timestamp)
        .collect()
}

// ── Interval mode ──────────────────────────────────────────────────

#[test]
fn interval_seconds_over_range() {
    let extraction_plan =
        ExtractionPlan::interval(IntervalStep::Seconds(secs(5))).with_range(secs(0), Some(secs(10)));
    assert_eq!(timestamps(&extraction_plan, None), vec![secs(0), secs(5)]);
}

#[test]
fn interval_exclusion_removes_matching_frame() {
    // 5 s at 24 fps is frame 120.
    let extraction_plan = ExtractionPlan::interval(IntervalStep::Seconds(secs(5)))
        .with_range(secs(0), Some(secs(10)))
        .with_excluded_frames([120]);
    assert_eq!(timestamps(&extraction_plan, None), vec![secs(0)]);
}

#[test]
fn interval_frames_walk_the_frame_grid() {
    let source = SyntheticDecoder::new().source();
    let extraction_plan =
        ExtractionPlan::interval(IntervalStep::Frames(48)).with_range(secs(0), Some(secs(10)));
    let instants = plan(&extraction_plan, &source, None).unwrap();

    let frames: Vec<u64> = instants.iter().map(|instant| instant.frame_number).collect();
    assert_eq!(frames, vec![0, 48, 96, 144, 192]);
    assert_eq!(instants[1].timestamp, secs(2));
}

#[test]
fn instants_are_strictly_increasing_and_in_range() {
    let source = SyntheticDecoder::new().source();
    let extraction_plan = ExtractionPlan::interval(IntervalStep::Seconds(millis(1_300)))
        .with_range(secs(7), Some(secs(41)));
    let instants = plan(&extraction_plan, &source, None).unwrap();

    assert!(!instants.is_empty());
    for (index, instant) in instants.iter().enumerate() {
        assert_eq!(instant.sequence_index, index);
        assert!(instant.timestamp >= secs(7));
        assert!(instant.timestamp < secs(41));
    }
    for pair in instants.windows(2) {
        assert!(pair[0].timestamp < pair[1].timestamp);
    }
}

#[test]
fn range_end_is_clamped_to_duration() {
    let extraction_plan = ExtractionPlan::interval(IntervalStep::Seconds(secs(20)))
        .with_range(secs(0), Some(secs(3_600)));
    assert_eq!(
        timestamps(&extraction_plan, None),
        vec![secs(0), secs(20), secs(40)]
    );
}

#[test]
fn max_frames_downsamples_evenly() {
    let source = SyntheticDecoder::new().source();
    let extraction_plan = ExtractionPlan::interval(IntervalStep::Seconds(secs(1))).with_max_frames(4);
    let instants = plan(&extraction_plan, &source, None).unwrap();

    let stamps: Vec<Duration> = instants.iter().map(|instant| instant.timestamp).collect();
    assert_eq!(stamps, vec![secs(0), secs(19), secs(39), secs(59)]);
    let indices: Vec<usize> = instants.iter().map(|instant| instant.sequence_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[test]
fn max_frames_above_count_keeps_everything() {
    let extraction_plan = ExtractionPlan::interval(IntervalStep::Seconds(secs(30))).with_max_frames(10);
    assert_eq!(timestamps(&extraction_plan, None), vec![secs(0), secs(30)]);
}

// ── Shot mode ──────────────────────────────────────────────────────

fn three_shots() -> ShotBoundaries {
    ShotBoundaries::new(vec![
        ShotBoundary::new(secs(0), secs(10)),
        ShotBoundary::new(secs(10), millis(10_200)),
        ShotBoundary::new(millis(10_200), secs(60)),
    ])
    .unwrap()
}

#[test]
fn shot_mode_picks_midpoints_and_short_shot_starts() {
    let shots = three_shots();
    let source = SyntheticDecoder::new().source();
    let instants = plan(&ExtractionPlan::shots(), &source, Some(&shots)).unwrap();

    let stamps: Vec<Duration> = instants.iter().map(|instant| instant.timestamp).collect();
    assert_eq!(stamps, vec![secs(5), secs(10), millis(35_100)]);

    let numbers: Vec<usize> = instants
        .iter()
        .map(|instant| instant.shot.unwrap().number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[test]
fn shot_mode_start_policy() {
    let extraction_plan = ExtractionPlan::shots().with_instant_policy(ShotInstantPolicy::Start);
    assert_eq!(
        timestamps(&extraction_plan, Some(&three_shots())),
        vec![secs(0), secs(10), millis(10_200)]
    );
}

#[test]
fn shot_exclusions_skip_by_number() {
    let extraction_plan = ExtractionPlan::shots().with_excluded_shots([2]);
    assert_eq!(
        timestamps(&extraction_plan, Some(&three_shots())),
        vec![secs(5), millis(35_100)]
    );
}

#[test]
fn out_of_range_shot_exclusion_is_ignored() {
    let extraction_plan = ExtractionPlan::shots().with_excluded_shots([0, 9]);
    assert_eq!(timestamps(&extraction_plan, Some(&three_shots())).len(), 3);
}

#[test]
fn shots_are_clipped_to_the_range() {
    let source = SyntheticDecoder::new().source();
    let extraction_plan = ExtractionPlan::shots().with_range(secs(4), Some(secs(20)));
    let instants = plan(&extraction_plan, &source, Some(&three_shots())).unwrap();

    let first = instants[0].shot.unwrap();
    assert_eq!((first.start, first.end), (secs(4), secs(10)));
    assert_eq!(instants[0].timestamp, secs(7));
    let last = instants.last().unwrap().shot.unwrap();
    assert_eq!(last.end, secs(20));
}

#[test]
fn shots_from_cuts_cover_the_range() {
    let shots = ShotBoundaries::from_cuts(&[secs(30), secs(10), secs(10), secs(90)], secs(0)..secs(60));
    let bounds: Vec<(Duration, Duration)> = shots
        .shots()
        .iter()
        .map(|shot| (shot.start, shot.end))
        .collect();
    assert_eq!(
        bounds,
        vec![(secs(0), secs(10)), (secs(10), secs(30)), (secs(30), secs(60))]
    );
    assert_eq!(shots.shot_at(secs(15)).map(|(index, _)| index), Some(1));
    assert!(shots.shot_at(secs(60)).is_none());
}

#[test]
fn overlapping_shots_are_rejected() {
    let result = ShotBoundaries::new(vec![
        ShotBoundary::new(secs(0), secs(10)),
        ShotBoundary::new(secs(5), secs(20)),
    ]);
    assert!(result.is_err());
}

// ── Errors ─────────────────────────────────────────────────────────

#[test]
fn empty_range_is_rejected() {
    let source = SyntheticDecoder::new().source();
    let extraction_plan =
        ExtractionPlan::interval(IntervalStep::Seconds(secs(1))).with_range(secs(70), None);
    assert!(matches!(
        plan(&extraction_plan, &source, None),
        Err(PlanningError::InvalidRange { .. })
    ));
}

#[test]
fn zero_interval_is_rejected() {
    let source = SyntheticDecoder::new().source();
    let extraction_plan = ExtractionPlan::interval(IntervalStep::Seconds(Duration::ZERO));
    assert_eq!(
        plan(&extraction_plan, &source, None),
        Err(PlanningError::InvalidInterval)
    );
}

#[test]
fn shot_mode_without_boundaries_is_rejected() {
    let source = SyntheticDecoder::new().source();
    assert_eq!(
        plan(&ExtractionPlan::shots(), &source, None),
        Err(PlanningError::MissingShotBoundaries)
    );
}

#[test]
fn excluding_everything_is_an_empty_plan() {
    let source = SyntheticDecoder::new().source();
    let extraction_plan = ExtractionPlan::interval(IntervalStep::Seconds(secs(5)))
        .with_range(secs(0), Some(secs(10)))
        .with_excluded_frames([0, 120]);
    assert_eq!(
        plan(&extraction_plan, &source, None),
        Err(PlanningError::EmptyPlan)
    );
}
