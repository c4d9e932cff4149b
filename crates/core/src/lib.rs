pub mod audio;
pub mod batch;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod format;
pub mod gaze;
pub mod paths;
pub mod pipeline;
pub mod provider;
pub mod questions;
pub mod staging;
pub mod transcribe;
pub mod types;
pub mod video;

pub use audio::{AudioExtractor, FfmpegAudioExtractor};
pub use config::{Overrides, Settings};
pub use error::{
    AttentionError, ConfigError, EvaluationError, IntervueError, PipelineError, QuestionSetError,
    Result, TranscriptionError,
};
pub use evaluator::{DisabledEvaluator, Evaluator, LlmEvaluator};
pub use format::{format_batch_readable, format_item_readable, format_timestamp};
pub use gaze::{GazePolicy, LateralMapping};
pub use pipeline::{Pipeline, PipelineOptions, Services};
pub use provider::{Provider, ProviderConfig};
pub use questions::{InterviewQuestion, QuestionSet, Rubric};
pub use transcribe::{Transcriber, WhisperOptions, WhisperTranscriber};
pub use types::{
    AttentionReport, AttentionStats, BatchResult, EvaluationResult, FrameDirection, ItemError,
    LateralDirection, PipelineItemResult, SkipReason, SkippedFile, Stage, StageError,
    SuspiciousEvent,
};
pub use video::{
    FfmpegOpener, LandmarkDetector, LandmarkServiceClient, LandmarkServiceConfig, VideoAnalyzer,
    VideoOpener,
};
