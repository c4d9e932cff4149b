pub mod analysis;
pub mod frames;
pub mod landmarks;

pub use analysis::VideoAnalyzer;
pub use frames::{FfmpegOpener, Frame, FrameSource, VideoOpener};
pub use landmarks::{
    FaceLandmarks, LandmarkDetector, LandmarkServiceClient, LandmarkServiceConfig, Point,
};
