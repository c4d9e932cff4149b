use std::path::PathBuf;

use thiserror::Error;

use crate::provider::ProviderError;

#[derive(Error, Debug)]
pub enum IntervueError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Question set error: {0}")]
    Questions(#[from] QuestionSetError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Transcription setup error: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Evaluator setup error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Landmark client setup error: {0}")]
    Landmarks(#[from] LandmarkError),

    #[error("Video decoder setup error: {0}")]
    Decoder(#[from] ffmpeg_next::Error),

    #[error("Setup task failed: {0}")]
    Setup(String),
}

pub type Result<T> = std::result::Result<T, IntervueError>;

/// Reasons an attention report ends up with `status = failed`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttentionError {
    #[error("no frames were processed")]
    NoFramesProcessed,

    #[error("no face was detected in any frame")]
    NoFaceDetected,

    #[error("video could not be opened for decoding: {reason}")]
    VideoUnreadable { reason: String },

    #[error("attention analysis aborted: {reason}")]
    AnalysisAborted { reason: String },

    #[error("landmark service failed on {failed_frames} frames and no face was detected: {last_error}")]
    LandmarkServiceFailed {
        failed_frames: usize,
        last_error: String,
    },

    #[error("attention analysis timed out")]
    TimedOut,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("failed to convert frame: {0}")]
    Convert(String),
}

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("landmark service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("landmark service returned {status}: {body}")]
    Service { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum TranscriptionError {
    #[error("Audio extraction failed for {video_path}: {reason}")]
    AudioExtractionFailed { video_path: PathBuf, reason: String },

    #[error("Failed to read audio {audio_path}: {reason}")]
    AudioUnreadable { audio_path: PathBuf, reason: String },

    #[error("Audio sample rate must be 16000 Hz, got {0}")]
    UnexpectedSampleRate(u32),

    #[error("Failed to load whisper model {model_path}: {reason}")]
    ModelLoadFailed { model_path: PathBuf, reason: String },

    #[error("Failed to download model from {url}: {reason}")]
    ModelDownloadFailed { url: String, reason: String },

    #[error("Whisper inference failed: {0}")]
    Inference(String),

    #[error("Transcription task aborted: {0}")]
    Aborted(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Evaluation is disabled for this run")]
    Disabled,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid API response: {0}")]
    InvalidApiResponse(serde_json::Value),

    #[error("LLM returned invalid JSON: {raw}")]
    InvalidReply { raw: String },

    #[error("Score {0} is outside the 0-4 range")]
    ScoreOutOfRange(i64),
}

#[derive(Error, Debug)]
pub enum QuestionSetError {
    #[error("Failed to read question dataset {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse question dataset {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid rubric entry for question {question_id}: {reason}")]
    InvalidRubric { question_id: String, reason: String },

    #[error("Question dataset {path} contains no questions")]
    Empty { path: PathBuf },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file {path}: {reason}")]
    FileUnreadable { path: PathBuf, reason: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid gaze policy: {0}")]
    InvalidPolicy(String),
}

/// Failures surfaced to the caller of a single-item run. Batch runs never
/// return these; they are folded into the per-item result instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Video not found: {0}")]
    VideoNotFound(PathBuf),

    #[error("Filename must contain a question ID, e.g. video_12.mp4 (got {0})")]
    MissingQuestionId(String),

    #[error("Question ID {0} not found in question set")]
    UnknownQuestionId(u32),

    #[error("Failed to stage video {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Batch directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to list batch directory {path}: {source}")]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Whether the failure is the caller's fault (bad input) rather than an
    /// internal fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::VideoNotFound(_)
                | PipelineError::MissingQuestionId(_)
                | PipelineError::UnknownQuestionId(_)
                | PipelineError::DirectoryNotFound(_)
        )
    }
}
