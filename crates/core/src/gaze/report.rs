use tracing::warn;

use crate::{
    error::AttentionError,
    gaze::{
        events::detect_events,
        policy::{DEFAULT_FPS, GazePolicy, MAX_PLAUSIBLE_FPS},
    },
    types::{AttentionStats, FrameDirection},
};

/// Replace a missing or implausible frame rate with [`DEFAULT_FPS`].
pub fn normalize_fps(fps: Option<f64>) -> f64 {
    match fps {
        Some(v) if v.is_finite() && v > 0.0 && v <= MAX_PLAUSIBLE_FPS => v,
        other => {
            warn!(
                reported_fps = ?other,
                fallback_fps = DEFAULT_FPS,
                "implausible frame rate, using fallback"
            );
            DEFAULT_FPS
        }
    }
}

fn summary_note(focus: f64, event_count: usize, policy: &GazePolicy) -> String {
    if focus > policy.high_focus_percent {
        format!("highly focused ({:.1}%), no concern", focus)
    } else if focus < policy.low_focus_percent {
        format!("low focus ({:.1}%), strong irregularity signal", focus)
    } else if event_count > 0 {
        format!(
            "moderately focused ({:.1}%), {} sustained glance(s) longer than {}s detected",
            focus, event_count, policy.event_threshold_seconds
        )
    } else {
        format!("moderately focused ({:.1}%), no significant indication", focus)
    }
}

/// Turn a complete direction sequence into attention statistics.
pub fn aggregate(
    sequence: &[FrameDirection],
    fps: Option<f64>,
    policy: &GazePolicy,
) -> Result<AttentionStats, AttentionError> {
    let total_frames = sequence.len();
    if total_frames == 0 {
        return Err(AttentionError::NoFramesProcessed);
    }

    let fps = normalize_fps(fps);

    let (mut center, mut left, mut right) = (0usize, 0usize, 0usize);
    for label in sequence {
        match label {
            FrameDirection::Center => center += 1,
            FrameDirection::Left => left += 1,
            FrameDirection::Right => right += 1,
            FrameDirection::Undetected => {}
        }
    }

    let detected = center + left + right;
    if detected == 0 {
        return Err(AttentionError::NoFaceDetected);
    }

    let pct = |count: usize| count as f64 / detected as f64 * 100.0;
    let focus_percentage = pct(center);

    let suspicious_events = detect_events(sequence, fps, policy.event_threshold_seconds);
    let suspicious_event_count = suspicious_events.len();

    Ok(AttentionStats {
        video_duration_seconds: total_frames as f64 / fps,
        analysis_fps: fps,
        total_frames,
        face_detected_frames: detected,
        focus_percentage,
        left_glance_percentage: pct(left),
        right_glance_percentage: pct(right),
        suspicious_event_count,
        suspicious_events,
        summary_note: summary_note(focus_percentage, suspicious_event_count, policy),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LateralDirection;
    use FrameDirection::*;

    fn seq(parts: &[(FrameDirection, usize)]) -> Vec<FrameDirection> {
        parts
            .iter()
            .flat_map(|(d, n)| std::iter::repeat_n(*d, *n))
            .collect()
    }

    fn sum(stats: &AttentionStats) -> f64 {
        stats.focus_percentage + stats.left_glance_percentage + stats.right_glance_percentage
    }

    #[test]
    fn empty_sequence_fails() {
        let err = aggregate(&[], Some(30.0), &GazePolicy::default()).unwrap_err();
        assert_eq!(err, AttentionError::NoFramesProcessed);
    }

    #[test]
    fn all_undetected_fails() {
        let s = seq(&[(Undetected, 90)]);
        let err = aggregate(&s, Some(30.0), &GazePolicy::default()).unwrap_err();
        assert_eq!(err, AttentionError::NoFaceDetected);
    }

    #[test]
    fn all_center_is_fully_focused() {
        let s = seq(&[(Center, 300)]);
        let stats = aggregate(&s, Some(30.0), &GazePolicy::default()).unwrap();
        assert_eq!(stats.focus_percentage, 100.0);
        assert_eq!(stats.suspicious_event_count, 0);
        assert!(stats.summary_note.starts_with("highly focused"));
        assert!((stats.video_duration_seconds - 10.0).abs() < 1e-9);
    }

    #[test]
    fn implausible_fps_falls_back_to_default() {
        let s = seq(&[(Center, 30)]);
        for fps in [None, Some(0.0), Some(-5.0), Some(240.0), Some(f64::NAN)] {
            let stats = aggregate(&s, fps, &GazePolicy::default()).unwrap();
            assert_eq!(stats.analysis_fps, DEFAULT_FPS);
        }
        let stats = aggregate(&s, Some(25.0), &GazePolicy::default()).unwrap();
        assert_eq!(stats.analysis_fps, 25.0);
    }

    #[test]
    fn right_glance_scenario() {
        let s = seq(&[(Center, 58), (Right, 62)]);
        let stats = aggregate(&s, Some(30.0), &GazePolicy::default()).unwrap();

        assert_eq!(stats.suspicious_event_count, 1);
        assert_eq!(
            stats.suspicious_events[0].direction,
            LateralDirection::Right
        );
        assert!((stats.right_glance_percentage - 51.666_666).abs() < 1e-3);
        assert!(stats.summary_note.starts_with("low focus"));
    }

    #[test]
    fn short_left_run_has_no_events() {
        let s = seq(&[(Left, 40)]);
        let stats = aggregate(&s, Some(30.0), &GazePolicy::default()).unwrap();
        assert_eq!(stats.left_glance_percentage, 100.0);
        assert_eq!(stats.suspicious_event_count, 0);
    }

    #[test]
    fn undetected_frames_are_excluded_from_the_denominator() {
        let s = seq(&[(Center, 50), (Undetected, 50), (Left, 25), (Right, 25)]);
        let stats = aggregate(&s, Some(30.0), &GazePolicy::default()).unwrap();
        assert_eq!(stats.face_detected_frames, 100);
        assert_eq!(stats.total_frames, 150);
        assert!((stats.focus_percentage - 50.0).abs() < 1e-9);
        assert!((sum(&stats) - 100.0).abs() < 0.01);
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let cases = [
            seq(&[(Center, 1), (Left, 1), (Right, 1)]),
            seq(&[(Center, 7), (Undetected, 3), (Left, 11), (Right, 13)]),
            seq(&[(Right, 1), (Undetected, 99)]),
        ];
        for s in cases {
            let stats = aggregate(&s, Some(29.97), &GazePolicy::default()).unwrap();
            assert!((sum(&stats) - 100.0).abs() < 0.01);
        }
    }

    #[test]
    fn moderate_focus_notes() {
        let policy = GazePolicy::default();
        let s = seq(&[(Center, 140), (Left, 60)]);
        let stats = aggregate(&s, Some(30.0), &policy).unwrap();
        assert_eq!(stats.suspicious_event_count, 1);
        assert!(stats.summary_note.contains("1 sustained glance"));

        let s = seq(&[(Center, 70), (Left, 15), (Center, 1), (Right, 14)]);
        let stats = aggregate(&s, Some(30.0), &policy).unwrap();
        assert!(stats.summary_note.contains("no significant indication"));
    }

    #[test]
    fn notes_near_thresholds_do_not_contradict_themselves() {
        let policy = GazePolicy::default();
        assert_eq!(
            summary_note(85.3, 0, &policy),
            "highly focused (85.3%), no concern"
        );
        assert_eq!(
            summary_note(49.6, 0, &policy),
            "low focus (49.6%), strong irregularity signal"
        );
        assert_eq!(
            summary_note(85.0, 2, &policy),
            "moderately focused (85.0%), 2 sustained glance(s) longer than 2s detected"
        );
    }
}
