use crate::{
    gaze::policy::{GazePolicy, LateralMapping, MIN_EYE_WIDTH, NEUTRAL_RATIO},
    types::FrameDirection,
    video::landmarks::FaceLandmarks,
};

/// Horizontal iris position within one eye, 0 at the inner corner and 1 at
/// the outer corner.
fn eye_ratio(inner_x: f64, outer_x: f64, iris_x: f64) -> f64 {
    let width = outer_x - inner_x;
    if width > MIN_EYE_WIDTH {
        (iris_x - inner_x) / width
    } else {
        NEUTRAL_RATIO
    }
}

/// Average gaze ratio of both eyes, or `None` when a required landmark is
/// missing or not a finite number.
pub fn gaze_ratio(landmarks: &FaceLandmarks, policy: &GazePolicy) -> Option<f64> {
    let eyes = &policy.eyes;
    let x = |idx: usize| landmarks.x(idx).filter(|v| v.is_finite());

    let first = eye_ratio(
        x(eyes.first_inner_corner)?,
        x(eyes.first_outer_corner)?,
        x(eyes.first_iris)?,
    );
    let second = eye_ratio(
        x(eyes.second_inner_corner)?,
        x(eyes.second_outer_corner)?,
        x(eyes.second_iris)?,
    );

    Some((first + second) / 2.0)
}

/// Classify one frame. Never fails: anything that cannot be read is
/// `Undetected`.
pub fn classify(landmarks: Option<&FaceLandmarks>, policy: &GazePolicy) -> FrameDirection {
    let Some(landmarks) = landmarks else {
        return FrameDirection::Undetected;
    };
    let Some(ratio) = gaze_ratio(landmarks, policy) else {
        return FrameDirection::Undetected;
    };

    let (low, high) = match policy.mapping {
        LateralMapping::Mirrored => (FrameDirection::Right, FrameDirection::Left),
        LateralMapping::Direct => (FrameDirection::Left, FrameDirection::Right),
    };

    if ratio < policy.lower_ratio {
        low
    } else if ratio > policy.upper_ratio {
        high
    } else {
        FrameDirection::Center
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::landmarks::Point;

    /// Build a face where both irises sit at `ratio` between the eye corners.
    fn face_with_ratio(ratio: f64) -> FaceLandmarks {
        let policy = GazePolicy::default();
        let eyes = policy.eyes;
        let mut points = vec![Point { x: 0.5, y: 0.5 }; 478];
        points[eyes.first_inner_corner].x = 0.30;
        points[eyes.first_outer_corner].x = 0.40;
        points[eyes.first_iris].x = 0.30 + 0.10 * ratio;
        points[eyes.second_inner_corner].x = 0.60;
        points[eyes.second_outer_corner].x = 0.70;
        points[eyes.second_iris].x = 0.60 + 0.10 * ratio;
        FaceLandmarks::new(points)
    }

    #[test]
    fn centered_iris_is_center() {
        let policy = GazePolicy::default();
        assert_eq!(
            classify(Some(&face_with_ratio(0.5)), &policy),
            FrameDirection::Center
        );
    }

    #[test]
    fn mirrored_mapping_puts_low_ratio_on_the_right() {
        let policy = GazePolicy::default();
        assert_eq!(
            classify(Some(&face_with_ratio(0.30)), &policy),
            FrameDirection::Right
        );
        assert_eq!(
            classify(Some(&face_with_ratio(0.70)), &policy),
            FrameDirection::Left
        );
    }

    #[test]
    fn direct_mapping_swaps_sides() {
        let policy = GazePolicy {
            mapping: LateralMapping::Direct,
            ..GazePolicy::default()
        };
        assert_eq!(
            classify(Some(&face_with_ratio(0.30)), &policy),
            FrameDirection::Left
        );
    }

    #[test]
    fn band_edges() {
        let policy = GazePolicy::default();
        assert_eq!(
            classify(Some(&face_with_ratio(0.46)), &policy),
            FrameDirection::Center
        );
        assert_eq!(
            classify(Some(&face_with_ratio(0.57)), &policy),
            FrameDirection::Center
        );
        assert_eq!(
            classify(Some(&face_with_ratio(0.44)), &policy),
            FrameDirection::Right
        );
        assert_eq!(
            classify(Some(&face_with_ratio(0.59)), &policy),
            FrameDirection::Left
        );
    }

    #[test]
    fn degenerate_eye_width_uses_neutral_ratio() {
        let policy = GazePolicy::default();
        let eyes = policy.eyes;
        let mut face = face_with_ratio(0.9);
        // Collapse both eyes; each falls back to 0.5.
        face.points_mut()[eyes.first_outer_corner].x = 0.30;
        face.points_mut()[eyes.second_outer_corner].x = 0.5995;
        assert_eq!(gaze_ratio(&face, &policy), Some(0.5));
        assert_eq!(classify(Some(&face), &policy), FrameDirection::Center);
    }

    #[test]
    fn missing_landmarks_are_undetected() {
        let policy = GazePolicy::default();
        let short = FaceLandmarks::new(vec![Point { x: 0.5, y: 0.5 }; 100]);
        assert_eq!(classify(Some(&short), &policy), FrameDirection::Undetected);
        assert_eq!(classify(None, &policy), FrameDirection::Undetected);
    }

    #[test]
    fn non_finite_coordinates_are_undetected() {
        let policy = GazePolicy::default();
        let mut face = face_with_ratio(0.5);
        face.points_mut()[policy.eyes.first_iris].x = f64::NAN;
        assert_eq!(classify(Some(&face), &policy), FrameDirection::Undetected);
    }

    #[test]
    fn classification_is_pure() {
        let policy = GazePolicy::default();
        let face = face_with_ratio(0.62);
        let first = classify(Some(&face), &policy);
        let second = classify(Some(&face), &policy);
        assert_eq!(first, second);
    }
}
