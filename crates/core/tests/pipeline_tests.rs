use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use intervue_core::{
    AttentionError, AttentionReport, EvaluationError, EvaluationResult, Evaluator, InterviewQuestion,
    ItemError, LandmarkDetector, Pipeline, PipelineError, PipelineOptions, QuestionSet, Rubric,
    Services, SkipReason, Stage, Transcriber, TranscriptionError, VideoOpener,
    audio::{AudioExtractor, SAMPLE_RATE},
    error::{FrameError, LandmarkError},
    video::{FaceLandmarks, Frame, FrameSource, Point},
};
use tokio_util::sync::CancellationToken;

// Fake videos are plain text files whose content names the scenario.
const GOOD_VIDEO: &[u8] = b"center";
const CORRUPT_VIDEO: &[u8] = b"corrupt";
const MUTE_VIDEO: &[u8] = b"mute";
const HANGING_VIDEO: &[u8] = b"hang";

struct StaticFrames {
    remaining: usize,
}

impl Iterator for StaticFrames {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(Ok(Frame::new(4, 4)))
    }
}

impl FrameSource for StaticFrames {
    fn fps(&self) -> Option<f64> {
        Some(30.0)
    }
}

struct FakeOpener {
    frames: usize,
}

impl VideoOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, AttentionError> {
        let content = std::fs::read(path).map_err(|e| AttentionError::VideoUnreadable {
            reason: e.to_string(),
        })?;
        if content == CORRUPT_VIDEO {
            return Err(AttentionError::VideoUnreadable {
                reason: "moov atom not found".to_string(),
            });
        }
        Ok(Box::new(StaticFrames {
            remaining: self.frames,
        }))
    }
}

/// Every frame shows one face looking straight at the camera.
struct CenteredFace;

impl LandmarkDetector for CenteredFace {
    fn detect(&self, _frame: &Frame) -> Result<Option<FaceLandmarks>, LandmarkError> {
        let mut points = vec![Point { x: 0.5, y: 0.5 }; 478];
        for (inner, outer, iris) in [(33, 133, 473), (362, 263, 468)] {
            points[inner].x = 0.40;
            points[outer].x = 0.60;
            points[iris].x = 0.50;
        }
        Ok(Some(FaceLandmarks::new(points)))
    }
}

/// A landmark call that takes 50ms per frame, counting how often it runs.
#[derive(Default)]
struct SlowFace {
    calls: AtomicUsize,
}

impl LandmarkDetector for SlowFace {
    fn detect(&self, frame: &Frame) -> Result<Option<FaceLandmarks>, LandmarkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        CenteredFace.detect(frame)
    }
}

/// Writes one second of silence, tracking how many extractions overlap.
#[derive(Default)]
struct FakeAudio {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl AudioExtractor for FakeAudio {
    async fn extract(&self, video_path: &Path, audio_path: &Path) -> Result<(), TranscriptionError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let content = tokio::fs::read(video_path).await?;
        let result = if content == MUTE_VIDEO {
            Err(TranscriptionError::AudioExtractionFailed {
                video_path: video_path.to_path_buf(),
                reason: "no audio stream".to_string(),
            })
        } else if content == HANGING_VIDEO {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        } else {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: SAMPLE_RATE,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::create(audio_path, spec).unwrap();
            for _ in 0..SAMPLE_RATE {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

struct FakeTranscriber;

impl Transcriber for FakeTranscriber {
    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscriptionError> {
        assert_eq!(samples.len(), SAMPLE_RATE as usize);
        Ok(" I trained a model with TensorFlow. ".to_string())
    }
}

#[derive(Default)]
struct FakeEvaluator {
    calls: AtomicUsize,
}

#[async_trait]
impl Evaluator for FakeEvaluator {
    async fn evaluate(
        &self,
        question: &InterviewQuestion,
        transcript: &str,
    ) -> Result<EvaluationResult, EvaluationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if transcript.is_empty() {
            return Err(EvaluationError::InvalidReply {
                raw: String::new(),
            });
        }
        Ok(EvaluationResult {
            question_id: question.question_id,
            score: 3,
            reason: "relevant".to_string(),
        })
    }
}

struct Harness {
    pipeline: Pipeline,
    audio: Arc<FakeAudio>,
    evaluator: Arc<FakeEvaluator>,
    staging_root: tempfile::TempDir,
    inputs: tempfile::TempDir,
}

fn questions() -> Arc<QuestionSet> {
    Arc::new(QuestionSet::from_questions([InterviewQuestion {
        question_id: 1,
        question_text: "Describe a challenge you overcame.".to_string(),
        rubric: Rubric::from([(4, "Comprehensive".to_string()), (0, "Unanswered".to_string())]),
    }]))
}

fn harness(configure: impl FnOnce(&mut PipelineOptions)) -> Harness {
    harness_with(Arc::new(CenteredFace), 90, configure)
}

fn harness_with(
    landmarks: Arc<dyn LandmarkDetector>,
    frames: usize,
    configure: impl FnOnce(&mut PipelineOptions),
) -> Harness {
    let staging_root = tempfile::tempdir().unwrap();
    let audio = Arc::new(FakeAudio::default());
    let evaluator = Arc::new(FakeEvaluator::default());

    let mut options = PipelineOptions {
        staging_root: Some(staging_root.path().to_path_buf()),
        ..PipelineOptions::default()
    };
    configure(&mut options);

    let services = Services {
        video: Arc::new(FakeOpener { frames }),
        landmarks,
        audio: audio.clone(),
        transcriber: Arc::new(FakeTranscriber),
        evaluator: evaluator.clone(),
    };

    Harness {
        pipeline: Pipeline::new(services, questions(), options),
        audio,
        evaluator,
        staging_root,
        inputs: tempfile::tempdir().unwrap(),
    }
}

impl Harness {
    fn video(&self, name: &str, content: &[u8]) -> PathBuf {
        let path = self.inputs.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Staging directories may outlive the item by the time it takes a
    /// blocking task to notice cancellation.
    async fn assert_staging_cleaned(&self) {
        for _ in 0..50 {
            if std::fs::read_dir(self.staging_root.path()).unwrap().next().is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("staging root still has entries");
    }
}

#[tokio::test]
async fn single_item_runs_all_three_stages() {
    let h = harness(|_| {});
    let video = h.video("candidate_1.mp4", GOOD_VIDEO);

    let result = h
        .pipeline
        .process_single(&video, None, true, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.source, "candidate_1.mp4");
    assert_eq!(result.question_id, Some(1));
    assert_eq!(
        result.transcript.as_deref(),
        Some("I trained a model with TensorFlow.")
    );
    assert_eq!(result.evaluation.as_ref().unwrap().score, 3);
    let stats = result.attention.stats().unwrap();
    assert_eq!(stats.focus_percentage, 100.0);
    assert_eq!(stats.total_frames, 90);
    assert!(result.stage_errors.is_empty());
    assert!(result.item_error.is_none());
    h.assert_staging_cleaned().await;
}

#[tokio::test]
async fn single_item_validation_errors_are_client_errors() {
    let h = harness(|_| {});
    let cancel = CancellationToken::new();

    let err = h
        .pipeline
        .process_single(Path::new("/no/such/video_1.mp4"), None, true, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::VideoNotFound(_)));
    assert!(err.is_client_error());

    let unnamed = h.video("interview.mp4", GOOD_VIDEO);
    let err = h
        .pipeline
        .process_single(&unnamed, None, true, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::MissingQuestionId(_)));

    let unknown = h.video("video_42.mp4", GOOD_VIDEO);
    let err = h
        .pipeline
        .process_single(&unknown, None, true, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnknownQuestionId(42)));
    assert!(err.is_client_error());

    assert_eq!(h.evaluator.calls.load(Ordering::SeqCst), 0);
    h.assert_staging_cleaned().await;
}

#[tokio::test]
async fn evaluation_can_be_disabled() {
    let h = harness(|_| {});
    let unnamed = h.video("interview.mp4", GOOD_VIDEO);

    let result = h
        .pipeline
        .process_single(&unnamed, None, false, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.evaluation.is_none());
    assert!(result.transcript.is_some());
    assert!(result.stage_error(Stage::Evaluation).is_none());
    assert_eq!(h.evaluator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreadable_video_still_reports_transcript() {
    let h = harness(|_| {});
    let video = h.video("video_1.mp4", CORRUPT_VIDEO);

    let result = h
        .pipeline
        .process_single(&video, Some(1), true, &CancellationToken::new())
        .await
        .unwrap();

    match &result.attention {
        AttentionReport::Failed { reason, error } => {
            assert_eq!(reason, "video_unreadable");
            assert!(!error.is_empty());
        }
        other => panic!("expected failed attention, got {other:?}"),
    }
    assert!(result.transcript.is_some());
    assert!(result.evaluation.is_some());
    assert!(result.stage_error(Stage::Attention).is_some());
}

#[tokio::test]
async fn transcription_failure_skips_evaluation_only() {
    let h = harness(|_| {});
    let video = h.video("video_1.mp4", MUTE_VIDEO);

    let result = h
        .pipeline
        .process_single(&video, None, true, &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.transcript.is_none());
    assert!(result.evaluation.is_none());
    assert!(result.attention.is_success());
    assert!(result.stage_error(Stage::Transcription).is_some());
    assert!(result.stage_error(Stage::Evaluation).is_some());
    assert_eq!(h.evaluator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn batch_skips_unmatched_files_and_isolates_unknown_ids() {
    let h = harness(|_| {});
    h.video("question_1.mp4", GOOD_VIDEO);
    h.video("intro.mp4", GOOD_VIDEO);
    h.video("question_99.mp4", GOOD_VIDEO);

    let batch = h
        .pipeline
        .process_batch(h.inputs.path(), true, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(batch.results.len(), 2);
    assert_eq!(batch.skipped.len(), 1);
    assert_eq!(batch.skipped[0].file, "intro.mp4");
    assert_eq!(batch.skipped[0].reason, SkipReason::NoQuestionMarker);

    let first = &batch.results[0];
    assert_eq!(first.source, "question_1.mp4");
    assert_eq!(first.evaluation.as_ref().unwrap().question_id, 1);

    let second = &batch.results[1];
    assert_eq!(second.source, "question_99.mp4");
    assert_eq!(second.question_id, Some(99));
    assert!(second.evaluation.is_none());
    assert!(second.stage_error(Stage::Evaluation).is_some());
    assert!(second.transcript.is_some());
    assert!(second.attention.is_success());

    h.assert_staging_cleaned().await;
}

#[tokio::test]
async fn batch_item_failures_do_not_abort_the_batch() {
    let h = harness(|_| {});
    h.video("question_1.mp4", CORRUPT_VIDEO);
    h.video("question_2.mp4", MUTE_VIDEO);
    h.video("question_3.webm", GOOD_VIDEO);

    let batch = h
        .pipeline
        .process_batch(h.inputs.path(), true, &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<_> = batch.results.iter().map(|r| r.question_id).collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);
    assert!(!batch.results[0].attention.is_success());
    assert!(batch.results[1].transcript.is_none());
    assert!(batch.results[2].attention.is_success());
    assert!(batch.results.iter().all(|r| r.item_error.is_none()));
}

#[tokio::test]
async fn hung_item_times_out_and_is_cleaned_up() {
    let h = harness(|options| options.item_timeout = Duration::from_millis(300));
    h.video("question_1.mp4", HANGING_VIDEO);
    h.video("question_2.mp4", GOOD_VIDEO);

    let batch = h
        .pipeline
        .process_batch(h.inputs.path(), true, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(batch.results.len(), 2);
    let hung = &batch.results[0];
    assert!(matches!(hung.item_error, Some(ItemError::TimedOut { .. })));
    match &hung.attention {
        AttentionReport::Failed { reason, .. } => assert_eq!(reason, "timed_out"),
        other => panic!("expected failed attention, got {other:?}"),
    }
    assert!(batch.results[1].item_error.is_none());
    h.assert_staging_cleaned().await;
}

#[tokio::test]
async fn stuck_attention_stage_stops_after_timeout() {
    let detector = Arc::new(SlowFace::default());
    let h = harness_with(detector.clone(), 1000, |options| {
        options.item_timeout = Duration::from_millis(300)
    });
    let video = h.video("answer_1.mp4", GOOD_VIDEO);

    let item = h
        .pipeline
        .process_single(&video, Some(1), false, &CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(item.item_error, Some(ItemError::TimedOut { .. })));
    let at_timeout = detector.calls.load(Ordering::SeqCst);
    assert!(at_timeout < 20, "detector ran {at_timeout} times");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let later = detector.calls.load(Ordering::SeqCst);
    assert!(
        later <= at_timeout + 1,
        "detector kept running after timeout: {at_timeout} -> {later}"
    );
    h.assert_staging_cleaned().await;
}

#[tokio::test]
async fn cancelled_batch_still_returns_one_result_per_file() {
    let h = harness(|_| {});
    h.video("question_1.mp4", GOOD_VIDEO);
    h.video("question_2.mp4", GOOD_VIDEO);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let batch = h
        .pipeline
        .process_batch(h.inputs.path(), true, &cancel)
        .await
        .unwrap();

    assert_eq!(batch.results.len(), 2);
    assert!(
        batch
            .results
            .iter()
            .all(|r| r.item_error == Some(ItemError::Cancelled))
    );
    h.assert_staging_cleaned().await;
}

#[tokio::test]
async fn batch_respects_the_concurrency_limit() {
    let h = harness(|options| options.max_concurrency = 1);
    for i in 1..=4 {
        h.video(&format!("question_{i}.mp4"), GOOD_VIDEO);
    }

    let batch = h
        .pipeline
        .process_batch(h.inputs.path(), false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(batch.results.len(), 4);
    assert_eq!(h.audio.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_batch_directory_is_a_client_error() {
    let h = harness(|_| {});
    let err = h
        .pipeline
        .process_batch(Path::new("/no/such/batch"), true, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_client_error());
}

#[tokio::test]
async fn results_serialize_with_status_tags() {
    let h = harness(|_| {});
    h.video("question_1.mp4", GOOD_VIDEO);

    let batch = h
        .pipeline
        .process_batch(h.inputs.path(), true, &CancellationToken::new())
        .await
        .unwrap();

    let json = serde_json::to_value(&batch).unwrap();
    let item = &json["results"][0];
    assert_eq!(item["attention"]["status"], "success");
    assert_eq!(item["attention"]["focus_percentage"], 100.0);
    assert_eq!(item["evaluation"]["score"], 3);
    assert!(item.get("item_error").is_none());
    assert!(json["skipped"].as_array().unwrap().is_empty());
}
