//! Per-item and batch orchestration of transcription, evaluation and
//! attention analysis.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    audio::{AudioExtractor, DEFAULT_OVERLAP_SECONDS, DEFAULT_WINDOW_SECONDS, FfmpegAudioExtractor},
    batch::{self, BatchEntry},
    config::{DEFAULT_ITEM_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENCY, Settings},
    error::{AttentionError, IntervueError, PipelineError, TranscriptionError},
    evaluator::{DisabledEvaluator, Evaluator, LlmEvaluator},
    gaze::GazePolicy,
    paths,
    questions::{InterviewQuestion, QuestionSet},
    staging::StagingArea,
    transcribe::{self, Transcriber, WhisperOptions, WhisperTranscriber},
    types::{
        AttentionReport, BatchResult, EvaluationResult, ItemError, PipelineItemResult, Stage,
        StageError,
    },
    video::{
        FfmpegOpener, LandmarkDetector, LandmarkServiceClient, VideoAnalyzer, VideoOpener,
    },
};

/// The external collaborators, constructed once per process.
#[derive(Clone)]
pub struct Services {
    pub video: Arc<dyn VideoOpener>,
    pub landmarks: Arc<dyn LandmarkDetector>,
    pub audio: Arc<dyn AudioExtractor>,
    pub transcriber: Arc<dyn Transcriber>,
    pub evaluator: Arc<dyn Evaluator>,
}

impl Services {
    /// Production collaborators: ffmpeg decoding, the landmark sidecar,
    /// ffmpeg audio extraction, whisper and the configured LLM.
    ///
    /// Downloads the whisper model first when it is missing. With
    /// `with_evaluator` off no LLM client is built, so no API key is needed.
    pub async fn from_settings(settings: &Settings, with_evaluator: bool) -> crate::Result<Self> {
        let video = FfmpegOpener::new()?;

        let landmark_config = settings.landmarks.clone();
        let landmarks = tokio::task::spawn_blocking(move || LandmarkServiceClient::new(landmark_config))
            .await
            .map_err(|e| IntervueError::Setup(e.to_string()))??;

        let model_path = paths::ensure_model(&settings.model_path).await?;
        let whisper_options = WhisperOptions {
            language: settings.language.clone(),
            initial_prompt: settings.initial_prompt.clone(),
            ..WhisperOptions::default()
        };
        let transcriber = tokio::task::spawn_blocking(move || {
            WhisperTranscriber::load(&model_path, whisper_options)
        })
        .await
        .map_err(|e| IntervueError::Setup(e.to_string()))??;

        let evaluator: Arc<dyn Evaluator> = if with_evaluator {
            let mut llm = LlmEvaluator::new(settings.provider)?;
            if let Some(model) = &settings.llm_model {
                llm = llm.with_model(model.clone());
            }
            if let Some(url) = &settings.llm_url {
                llm = llm.with_api_url(url.clone());
            }
            Arc::new(llm)
        } else {
            Arc::new(DisabledEvaluator)
        };

        Ok(Self {
            video: Arc::new(video),
            landmarks: Arc::new(landmarks),
            audio: Arc::new(FfmpegAudioExtractor::default()),
            transcriber: Arc::new(transcriber),
            evaluator,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub item_timeout: Duration,
    pub max_concurrency: usize,
    pub chunk_window_seconds: f64,
    pub chunk_overlap_seconds: f64,
    pub policy: GazePolicy,
    /// Where per-item staging directories are created; system temp dir if unset.
    pub staging_root: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            item_timeout: Duration::from_secs(DEFAULT_ITEM_TIMEOUT_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            chunk_window_seconds: DEFAULT_WINDOW_SECONDS,
            chunk_overlap_seconds: DEFAULT_OVERLAP_SECONDS,
            policy: GazePolicy::default(),
            staging_root: None,
        }
    }
}

impl From<&Settings> for PipelineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            item_timeout: settings.item_timeout,
            max_concurrency: settings.max_concurrency,
            chunk_window_seconds: settings.chunk_window_seconds,
            chunk_overlap_seconds: settings.chunk_overlap_seconds,
            policy: settings.policy.clone(),
            staging_root: None,
        }
    }
}

struct Inner {
    analyzer: VideoAnalyzer,
    audio: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    evaluator: Arc<dyn Evaluator>,
    questions: Arc<QuestionSet>,
    options: PipelineOptions,
}

/// One unit of work after validation.
struct ItemPlan {
    source: PathBuf,
    display_name: String,
    question_id: Option<u32>,
    question: Option<InterviewQuestion>,
    evaluate: bool,
}

/// Cheap to clone; every clone shares the same services and question set.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl Pipeline {
    pub fn new(services: Services, questions: Arc<QuestionSet>, options: PipelineOptions) -> Self {
        let analyzer = VideoAnalyzer::new(services.video, services.landmarks, options.policy.clone());
        Self {
            inner: Arc::new(Inner {
                analyzer,
                audio: services.audio,
                transcriber: services.transcriber,
                evaluator: services.evaluator,
                questions,
                options,
            }),
        }
    }

    /// Process one video.
    ///
    /// Input problems (missing file, no resolvable question id while
    /// evaluation is on) are returned as errors before any work starts.
    /// Everything after that is folded into the returned result.
    pub async fn process_single(
        &self,
        video: &Path,
        question_id: Option<u32>,
        evaluate: bool,
        cancel: &CancellationToken,
    ) -> Result<PipelineItemResult, PipelineError> {
        if !video.is_file() {
            return Err(PipelineError::VideoNotFound(video.to_path_buf()));
        }
        let display_name = display_name(video);
        let question_id = question_id.or_else(|| batch::question_id_from_single_name(video));

        let question = match (evaluate, question_id) {
            (true, None) => return Err(PipelineError::MissingQuestionId(display_name)),
            (true, Some(id)) => Some(
                self.inner
                    .questions
                    .get(id)
                    .cloned()
                    .ok_or(PipelineError::UnknownQuestionId(id))?,
            ),
            (false, Some(id)) => self.inner.questions.get(id).cloned(),
            (false, None) => None,
        };

        let plan = ItemPlan {
            source: video.to_path_buf(),
            display_name,
            question_id,
            question,
            evaluate,
        };
        let span = item_span(&plan);
        async {
            let staging = StagingArea::stage(&plan.source, self.inner.options.staging_root.as_deref())
                .await?;
            Ok::<_, PipelineError>(self.run_guarded(plan, staging, cancel).await)
        }
        .instrument(span)
        .await
    }

    /// Process every matching video in `dir`.
    ///
    /// Only an unreadable directory fails the call. Each accepted file yields
    /// exactly one result, in file-name order, whatever happens to it.
    pub async fn process_batch(
        &self,
        dir: &Path,
        evaluate: bool,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, PipelineError> {
        let discovery = batch::discover(dir)?;
        info!(
            dir = %dir.display(),
            accepted = discovery.entries.len(),
            skipped = discovery.skipped.len(),
            "batch discovered"
        );

        let entries = discovery.entries;
        let semaphore = Arc::new(Semaphore::new(self.inner.options.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, entry) in entries.iter().cloned().enumerate() {
            let pipeline = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let result = match permit {
                    Some(_permit) => pipeline.process_entry(entry, evaluate, &cancel).await,
                    None => PipelineItemResult::aborted(
                        entry.file_name,
                        Some(entry.question_id),
                        ItemError::Cancelled,
                    ),
                };
                (index, result)
            });
        }

        let mut slots: Vec<Option<PipelineItemResult>> = vec![None; entries.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "batch worker failed"),
            }
        }

        let results = slots
            .into_iter()
            .zip(entries)
            .map(|(slot, entry)| {
                slot.unwrap_or_else(|| {
                    PipelineItemResult::aborted(
                        entry.file_name,
                        Some(entry.question_id),
                        ItemError::Internal {
                            message: "worker task failed".to_string(),
                        },
                    )
                })
            })
            .collect();

        Ok(BatchResult {
            results,
            skipped: discovery.skipped,
        })
    }

    async fn process_entry(
        &self,
        entry: BatchEntry,
        evaluate: bool,
        cancel: &CancellationToken,
    ) -> PipelineItemResult {
        let question = self.inner.questions.get(entry.question_id).cloned();
        if question.is_none() {
            warn!(
                file = %entry.file_name,
                question_id = entry.question_id,
                "question id not in question set"
            );
        }
        let plan = ItemPlan {
            source: entry.path,
            display_name: entry.file_name,
            question_id: Some(entry.question_id),
            question,
            evaluate,
        };
        let span = item_span(&plan);

        async {
            let staging =
                match StagingArea::stage(&plan.source, self.inner.options.staging_root.as_deref())
                    .await
                {
                    Ok(staging) => staging,
                    Err(e) => {
                        warn!(error = %e, "staging failed");
                        return PipelineItemResult::aborted(
                            plan.display_name,
                            plan.question_id,
                            ItemError::StagingFailed {
                                message: e.to_string(),
                            },
                        );
                    }
                };
            self.run_guarded(plan, staging, cancel).await
        }
        .instrument(span)
        .await
    }

    /// Run a staged item under the per-item timeout and the cancellation token.
    async fn run_guarded(
        &self,
        plan: ItemPlan,
        staging: StagingArea,
        cancel: &CancellationToken,
    ) -> PipelineItemResult {
        let started = Instant::now();
        let timeout = self.inner.options.item_timeout;
        let (name, question_id) = (plan.display_name.clone(), plan.question_id);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("item cancelled");
                PipelineItemResult::aborted(name, question_id, ItemError::Cancelled)
            }
            outcome = tokio::time::timeout(timeout, self.run_item(plan, Arc::new(staging), cancel)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(timeout_secs = timeout.as_secs(), "item timed out");
                        PipelineItemResult::aborted(
                            name,
                            question_id,
                            ItemError::TimedOut {
                                after_seconds: timeout.as_secs(),
                            },
                        )
                    }
                }
            }
        };

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            attention_ok = result.attention.is_success(),
            transcript = result.transcript.is_some(),
            evaluated = result.evaluation.is_some(),
            "item finished"
        );
        result
    }

    async fn run_item(
        &self,
        plan: ItemPlan,
        staging: Arc<StagingArea>,
        cancel: &CancellationToken,
    ) -> PipelineItemResult {
        // Stops the blocking attention task if this future is dropped early.
        let attention_token = cancel.child_token();
        let _stop_attention = attention_token.clone().drop_guard();

        let (attention, (transcript, evaluation, mut stage_errors)) = tokio::join!(
            self.attention_stage(Arc::clone(&staging), attention_token),
            self.speech_stage(&plan, Arc::clone(&staging)),
        );

        if let AttentionReport::Failed { error, .. } = &attention {
            stage_errors.push(StageError {
                stage: Stage::Attention,
                message: error.clone(),
            });
        }
        stage_errors.sort_by_key(|e| e.stage as u8);

        PipelineItemResult {
            source: plan.display_name,
            question_id: plan.question_id,
            transcript,
            evaluation,
            attention,
            stage_errors,
            item_error: None,
        }
    }

    async fn attention_stage(
        &self,
        staging: Arc<StagingArea>,
        token: CancellationToken,
    ) -> AttentionReport {
        let analyzer = self.inner.analyzer.clone();
        let joined = tokio::task::spawn_blocking(move || {
            analyzer.analyze_until(staging.video_path(), &token)
        })
        .await;

        joined.unwrap_or_else(|e| {
            AttentionReport::failed(&AttentionError::AnalysisAborted {
                reason: e.to_string(),
            })
        })
    }

    async fn speech_stage(
        &self,
        plan: &ItemPlan,
        staging: Arc<StagingArea>,
    ) -> (Option<String>, Option<EvaluationResult>, Vec<StageError>) {
        let mut errors = Vec::new();

        let transcript = match self.transcribe(staging).await {
            Ok(text) => {
                debug!(chars = text.len(), "transcription complete");
                Some(text)
            }
            Err(e) => {
                warn!(error = %e, "transcription failed");
                errors.push(StageError {
                    stage: Stage::Transcription,
                    message: e.to_string(),
                });
                None
            }
        };

        if !plan.evaluate {
            return (transcript, None, errors);
        }

        let evaluation = match (&plan.question, &transcript) {
            (Some(question), Some(text)) => {
                match self.inner.evaluator.evaluate(question, text).await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        warn!(error = %e, "evaluation failed");
                        errors.push(StageError {
                            stage: Stage::Evaluation,
                            message: e.to_string(),
                        });
                        None
                    }
                }
            }
            (None, _) => {
                let message = match plan.question_id {
                    Some(id) => PipelineError::UnknownQuestionId(id).to_string(),
                    None => PipelineError::MissingQuestionId(plan.display_name.clone()).to_string(),
                };
                errors.push(StageError {
                    stage: Stage::Evaluation,
                    message,
                });
                None
            }
            (Some(_), None) => {
                errors.push(StageError {
                    stage: Stage::Evaluation,
                    message: "skipped: no transcript to evaluate".to_string(),
                });
                None
            }
        };

        (transcript, evaluation, errors)
    }

    async fn transcribe(&self, staging: Arc<StagingArea>) -> Result<String, TranscriptionError> {
        self.inner
            .audio
            .extract(staging.video_path(), staging.audio_path())
            .await?;

        let transcriber = Arc::clone(&self.inner.transcriber);
        let (window, overlap) = (
            self.inner.options.chunk_window_seconds,
            self.inner.options.chunk_overlap_seconds,
        );
        tokio::task::spawn_blocking(move || {
            transcribe::transcribe_file(transcriber.as_ref(), staging.audio_path(), window, overlap)
        })
        .await
        .map_err(|e| TranscriptionError::Aborted(e.to_string()))?
    }
}

fn item_span(plan: &ItemPlan) -> tracing::Span {
    info_span!(
        "item",
        source = %plan.display_name,
        question_id = plan.question_id,
        run_id = %Uuid::new_v4(),
    )
}
