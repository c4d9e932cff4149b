use serde::{Deserialize, Serialize, Serializer};

use crate::error::AttentionError;

/// Horizontal gaze label for one decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameDirection {
    Center,
    Left,
    Right,
    Undetected,
}

impl FrameDirection {
    pub fn lateral(self) -> Option<LateralDirection> {
        match self {
            FrameDirection::Left => Some(LateralDirection::Left),
            FrameDirection::Right => Some(LateralDirection::Right),
            FrameDirection::Center | FrameDirection::Undetected => None,
        }
    }

    pub fn is_detected(self) -> bool {
        self != FrameDirection::Undetected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateralDirection {
    Left,
    Right,
}

/// A sustained off-camera glance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousEvent {
    #[serde(serialize_with = "round2")]
    pub start_time_seconds: f64,
    #[serde(serialize_with = "round2")]
    pub end_time_seconds: f64,
    #[serde(serialize_with = "round2")]
    pub duration_seconds: f64,
    pub direction: LateralDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttentionStats {
    #[serde(serialize_with = "round2")]
    pub video_duration_seconds: f64,
    #[serde(serialize_with = "round2")]
    pub analysis_fps: f64,
    pub total_frames: usize,
    pub face_detected_frames: usize,
    #[serde(serialize_with = "round2")]
    pub focus_percentage: f64,
    #[serde(serialize_with = "round2")]
    pub left_glance_percentage: f64,
    #[serde(serialize_with = "round2")]
    pub right_glance_percentage: f64,
    pub suspicious_event_count: usize,
    pub suspicious_events: Vec<SuspiciousEvent>,
    pub summary_note: String,
}

/// Final gaze report for one video. Serialized with a `status` tag of
/// `success` or `failed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttentionReport {
    Success(AttentionStats),
    Failed { reason: String, error: String },
}

impl AttentionReport {
    pub fn failed(err: &AttentionError) -> Self {
        let reason = match err {
            AttentionError::NoFramesProcessed => "no_frames_processed",
            AttentionError::NoFaceDetected => "no_face_detected",
            AttentionError::VideoUnreadable { .. } => "video_unreadable",
            AttentionError::AnalysisAborted { .. } => "analysis_aborted",
            AttentionError::LandmarkServiceFailed { .. } => "landmark_service_failed",
            AttentionError::TimedOut => "timed_out",
        };
        AttentionReport::Failed {
            reason: reason.to_string(),
            error: err.to_string(),
        }
    }

    pub fn stats(&self) -> Option<&AttentionStats> {
        match self {
            AttentionReport::Success(stats) => Some(stats),
            AttentionReport::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttentionReport::Success(_))
    }
}

impl From<Result<AttentionStats, AttentionError>> for AttentionReport {
    fn from(result: Result<AttentionStats, AttentionError>) -> Self {
        match result {
            Ok(stats) => AttentionReport::Success(stats),
            Err(e) => AttentionReport::failed(&e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub question_id: u32,
    pub score: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Staging,
    Transcription,
    Evaluation,
    Attention,
}

/// A stage that failed without aborting the rest of the item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

/// Whole-item failures: the item did not run to completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemError {
    TimedOut { after_seconds: u64 },
    Cancelled,
    StagingFailed { message: String },
    Internal { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineItemResult {
    pub source: String,
    pub question_id: Option<u32>,
    pub transcript: Option<String>,
    pub evaluation: Option<EvaluationResult>,
    pub attention: AttentionReport,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stage_errors: Vec<StageError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_error: Option<ItemError>,
}

impl PipelineItemResult {
    /// Result for an item that never produced any stage output.
    pub fn aborted(source: String, question_id: Option<u32>, error: ItemError) -> Self {
        let attention = match &error {
            ItemError::TimedOut { .. } => AttentionReport::failed(&AttentionError::TimedOut),
            ItemError::Cancelled => AttentionReport::failed(&AttentionError::AnalysisAborted {
                reason: "cancelled".to_string(),
            }),
            ItemError::StagingFailed { message } => {
                AttentionReport::failed(&AttentionError::VideoUnreadable {
                    reason: message.clone(),
                })
            }
            ItemError::Internal { message } => {
                AttentionReport::failed(&AttentionError::AnalysisAborted {
                    reason: message.clone(),
                })
            }
        };
        Self {
            source,
            question_id,
            transcript: None,
            evaluation: None,
            attention,
            stage_errors: Vec::new(),
            item_error: Some(error),
        }
    }

    pub fn stage_error(&self, stage: Stage) -> Option<&StageError> {
        self.stage_errors.iter().find(|e| e.stage == stage)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnsupportedExtension,
    NoQuestionMarker,
    InvalidQuestionId,
    NotAFile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    pub results: Vec<PipelineItemResult>,
    pub skipped: Vec<SkippedFile>,
}

pub(crate) fn round2<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64((value * 100.0).round() / 100.0)
}
