//! Gaze attention analysis: per-frame classification, sustained-glance
//! detection and the aggregated attention report.

pub mod classifier;
pub mod events;
pub mod policy;
pub mod report;

pub use classifier::{classify, gaze_ratio};
pub use events::detect_events;
pub use policy::{EyeLandmarkIndices, GazePolicy, LateralMapping};
pub use report::{aggregate, normalize_fps};
