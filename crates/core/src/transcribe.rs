use std::{path::Path, sync::Arc};

use tracing::debug;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::{
    audio::{self, SAMPLE_RATE},
    error::TranscriptionError,
};

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_INITIAL_PROMPT: &str =
    "This audio is an English HR interview. Transcribe clearly.";

/// Speech-to-text over one window of 16 kHz mono samples.
///
/// Implementations are blocking; callers run them off the async runtime.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscriptionError>;
}

#[derive(Debug, Clone)]
pub struct WhisperOptions {
    pub language: String,
    pub initial_prompt: String,
    pub use_gpu: bool,
}

impl Default for WhisperOptions {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            initial_prompt: DEFAULT_INITIAL_PROMPT.to_string(),
            use_gpu: cfg!(feature = "cuda"),
        }
    }
}

/// Whisper model loaded once and shared by every item.
pub struct WhisperTranscriber {
    ctx: Arc<WhisperContext>,
    options: WhisperOptions,
}

impl WhisperTranscriber {
    pub fn load(model_path: &Path, options: WhisperOptions) -> Result<Self, TranscriptionError> {
        let load_failed = |reason: String| TranscriptionError::ModelLoadFailed {
            model_path: model_path.to_path_buf(),
            reason,
        };

        let model_path_str = model_path
            .to_str()
            .ok_or_else(|| load_failed("model path is not valid UTF-8".to_string()))?;

        let ctx_params = WhisperContextParameters {
            use_gpu: options.use_gpu,
            flash_attn: options.use_gpu,
            ..Default::default()
        };
        let ctx = WhisperContext::new_with_params(model_path_str, ctx_params)
            .map_err(|e| load_failed(e.to_string()))?;

        Ok(Self {
            ctx: Arc::new(ctx),
            options,
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, samples: &[f32]) -> Result<String, TranscriptionError> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(&self.options.language));
        if !self.options.initial_prompt.is_empty() {
            params.set_initial_prompt(&self.options.initial_prompt);
        }
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_special(false);
        params.set_print_timestamps(false);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;
        state
            .full(params, samples)
            .map_err(|e| TranscriptionError::Inference(e.to_string()))?;

        let mut text = String::new();
        for segment in state.as_iter() {
            match segment.to_str() {
                Ok(s) => text.push_str(s),
                Err(e) => debug!(error = %e, "skipping undecodable segment"),
            }
        }
        Ok(text)
    }
}

/// Transcribe long audio window by window and join the trimmed texts.
pub fn transcribe_chunked(
    transcriber: &dyn Transcriber,
    samples: &[f32],
    window_seconds: f64,
    overlap_seconds: f64,
) -> Result<String, TranscriptionError> {
    let windows = audio::chunk_windows(samples.len(), SAMPLE_RATE, window_seconds, overlap_seconds);
    debug!(chunks = windows.len(), samples = samples.len(), "transcribing");

    let mut parts = Vec::with_capacity(windows.len());
    for window in windows {
        let text = transcriber.transcribe(&samples[window])?;
        let text = text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
    }
    Ok(parts.join(" "))
}

/// Load a WAV file and transcribe it in windows.
pub fn transcribe_file(
    transcriber: &dyn Transcriber,
    audio_path: &Path,
    window_seconds: f64,
    overlap_seconds: f64,
) -> Result<String, TranscriptionError> {
    let samples = audio::load_wav(audio_path)?;
    transcribe_chunked(transcriber, &samples, window_seconds, overlap_seconds)
}
