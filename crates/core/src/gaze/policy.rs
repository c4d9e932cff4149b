//! Calibration constants for gaze classification and reporting.
//!
//! None of these are derived from the data. They are policy knobs and are
//! loaded from configuration so they can be recalibrated without a rebuild.

use crate::error::ConfigError;

/// Gaze ratio below which a frame counts as a lateral glance.
pub const DEFAULT_LOWER_RATIO: f64 = 0.45;
/// Gaze ratio above which a frame counts as the opposite lateral glance.
pub const DEFAULT_UPPER_RATIO: f64 = 0.58;
/// Ratio used when an eye's corner-to-corner width is degenerate.
pub const NEUTRAL_RATIO: f64 = 0.5;
/// Eye widths at or below this are treated as degenerate (closed or occluded eye).
pub const MIN_EYE_WIDTH: f64 = 0.001;
/// Minimum run duration for a glance to be reported as an event.
pub const DEFAULT_EVENT_THRESHOLD_SECONDS: f64 = 2.0;
/// Frame rate assumed when the container reports an implausible value.
pub const DEFAULT_FPS: f64 = 30.0;
/// Frame rates above this are treated as sensor garbage.
pub const MAX_PLAUSIBLE_FPS: f64 = 100.0;
pub const DEFAULT_HIGH_FOCUS_PERCENT: f64 = 85.0;
pub const DEFAULT_LOW_FOCUS_PERCENT: f64 = 50.0;

/// How a low/high gaze ratio maps onto Left/Right.
///
/// With a front-facing webcam the image is mirrored relative to the subject,
/// so a low ratio (iris near the inner corner in image space) means the
/// subject is looking to their right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LateralMapping {
    /// low ratio -> Right, high ratio -> Left
    #[default]
    Mirrored,
    /// low ratio -> Left, high ratio -> Right
    Direct,
}

impl std::str::FromStr for LateralMapping {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mirrored" => Ok(LateralMapping::Mirrored),
            "direct" => Ok(LateralMapping::Direct),
            other => Err(ConfigError::InvalidValue {
                key: "gaze.mapping".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Face-mesh landmark indices used to locate both eyes.
///
/// Defaults follow the 478-point refined MediaPipe Face Mesh topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeLandmarkIndices {
    pub first_inner_corner: usize,
    pub first_outer_corner: usize,
    pub first_iris: usize,
    pub second_inner_corner: usize,
    pub second_outer_corner: usize,
    pub second_iris: usize,
}

impl Default for EyeLandmarkIndices {
    fn default() -> Self {
        Self {
            first_inner_corner: 33,
            first_outer_corner: 133,
            first_iris: 473,
            second_inner_corner: 362,
            second_outer_corner: 263,
            second_iris: 468,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GazePolicy {
    pub lower_ratio: f64,
    pub upper_ratio: f64,
    pub mapping: LateralMapping,
    pub eyes: EyeLandmarkIndices,
    pub event_threshold_seconds: f64,
    pub high_focus_percent: f64,
    pub low_focus_percent: f64,
}

impl Default for GazePolicy {
    fn default() -> Self {
        Self {
            lower_ratio: DEFAULT_LOWER_RATIO,
            upper_ratio: DEFAULT_UPPER_RATIO,
            mapping: LateralMapping::default(),
            eyes: EyeLandmarkIndices::default(),
            event_threshold_seconds: DEFAULT_EVENT_THRESHOLD_SECONDS,
            high_focus_percent: DEFAULT_HIGH_FOCUS_PERCENT,
            low_focus_percent: DEFAULT_LOW_FOCUS_PERCENT,
        }
    }
}

impl GazePolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lower_ratio < self.upper_ratio) {
            return Err(ConfigError::InvalidPolicy(format!(
                "lower ratio {} must be below upper ratio {}",
                self.lower_ratio, self.upper_ratio
            )));
        }
        if !(self.event_threshold_seconds > 0.0) {
            return Err(ConfigError::InvalidPolicy(format!(
                "event threshold must be positive, got {}",
                self.event_threshold_seconds
            )));
        }
        if !(self.low_focus_percent <= self.high_focus_percent) {
            return Err(ConfigError::InvalidPolicy(format!(
                "low focus threshold {} exceeds high focus threshold {}",
                self.low_focus_percent, self.high_focus_percent
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(GazePolicy::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_ratio_band() {
        let policy = GazePolicy {
            lower_ratio: 0.6,
            upper_ratio: 0.4,
            ..GazePolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn parses_mapping_names() {
        assert_eq!("Mirrored".parse::<LateralMapping>().unwrap(), LateralMapping::Mirrored);
        assert_eq!(" direct ".parse::<LateralMapping>().unwrap(), LateralMapping::Direct);
        assert!("sideways".parse::<LateralMapping>().is_err());
    }
}
