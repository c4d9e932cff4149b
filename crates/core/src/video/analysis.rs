use std::{path::Path, sync::Arc, time::Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::AttentionError,
    gaze::{GazePolicy, aggregate, classify},
    types::{AttentionReport, FrameDirection},
    video::{
        frames::{FrameSource, VideoOpener},
        landmarks::LandmarkDetector,
    },
};

/// Per-video gaze analysis: decode, detect, classify, aggregate.
#[derive(Clone)]
pub struct VideoAnalyzer {
    opener: Arc<dyn VideoOpener>,
    detector: Arc<dyn LandmarkDetector>,
    policy: GazePolicy,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrameCounters {
    pub face_frames: usize,
    pub decode_errors: usize,
    pub detector_errors: usize,
    pub last_detector_error: Option<String>,
}

impl VideoAnalyzer {
    pub fn new(
        opener: Arc<dyn VideoOpener>,
        detector: Arc<dyn LandmarkDetector>,
        policy: GazePolicy,
    ) -> Self {
        Self {
            opener,
            detector,
            policy,
        }
    }

    /// Analyze one video. Never fails: every failure becomes a `failed` report.
    pub fn analyze(&self, path: &Path) -> AttentionReport {
        self.analyze_until(path, &CancellationToken::new())
    }

    /// Like [`analyze`](Self::analyze), but stops decoding once `cancel` fires.
    pub fn analyze_until(&self, path: &Path, cancel: &CancellationToken) -> AttentionReport {
        let started = Instant::now();
        let result = self.run(path, cancel);
        match &result {
            Ok(stats) => info!(
                video = %path.display(),
                frames = stats.total_frames,
                focus = stats.focus_percentage,
                events = stats.suspicious_event_count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "attention analysis complete"
            ),
            Err(e) => warn!(video = %path.display(), error = %e, "attention analysis failed"),
        }
        result.into()
    }

    fn run(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<crate::types::AttentionStats, AttentionError> {
        if !path.is_file() {
            return Err(AttentionError::VideoUnreadable {
                reason: format!("file not found: {}", path.display()),
            });
        }

        let mut source = self.opener.open(path)?;
        let fps = source.fps();
        let (sequence, counters) = self.direction_sequence(source.as_mut(), cancel);
        // Release the decoder before aggregating.
        drop(source);

        if cancel.is_cancelled() {
            return Err(AttentionError::AnalysisAborted {
                reason: "cancelled".to_string(),
            });
        }

        if counters.decode_errors > 0 || counters.detector_errors > 0 {
            info!(
                video = %path.display(),
                decode_errors = counters.decode_errors,
                detector_errors = counters.detector_errors,
                "frames counted as undetected"
            );
        }

        // With no face seen anywhere, detector failures mean the service was
        // down, not that the candidate was absent.
        if counters.face_frames == 0 && counters.detector_errors > 0 {
            return Err(AttentionError::LandmarkServiceFailed {
                failed_frames: counters.detector_errors,
                last_error: counters.last_detector_error.unwrap_or_default(),
            });
        }

        aggregate(&sequence, fps, &self.policy)
    }

    /// Label every frame the source yields. A frame that fails to decode or
    /// whose landmark call fails is recorded as `Undetected`; partially
    /// corrupt recordings are common and should not sink the whole video.
    pub fn direction_sequence(
        &self,
        source: &mut dyn FrameSource,
        cancel: &CancellationToken,
    ) -> (Vec<FrameDirection>, FrameCounters) {
        let mut sequence = Vec::new();
        let mut counters = FrameCounters::default();

        for (index, frame) in source.enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let direction = match frame {
                Ok(frame) => match self.detector.detect(&frame) {
                    Ok(face) => {
                        if face.is_some() {
                            counters.face_frames += 1;
                        }
                        classify(face.as_ref(), &self.policy)
                    }
                    Err(e) => {
                        debug!(frame = index, error = %e, "landmark detection failed");
                        counters.detector_errors += 1;
                        counters.last_detector_error = Some(e.to_string());
                        FrameDirection::Undetected
                    }
                },
                Err(e) => {
                    debug!(frame = index, error = %e, "frame skipped");
                    counters.decode_errors += 1;
                    FrameDirection::Undetected
                }
            };
            sequence.push(direction);
        }

        (sequence, counters)
    }
}
