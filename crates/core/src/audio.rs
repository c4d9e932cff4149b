//! Audio side of an interview item: ffmpeg extraction, WAV loading and
//! fixed-size windowing for the transcriber.

use std::{ops::Range, path::Path};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::TranscriptionError;

pub const SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_WINDOW_SECONDS: f64 = 30.0;
pub const DEFAULT_OVERLAP_SECONDS: f64 = 2.0;

/// Produces a 16 kHz mono PCM WAV file from a video.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(&self, video_path: &Path, audio_path: &Path)
    -> Result<(), TranscriptionError>;
}

/// Shells out to the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegAudioExtractor {
    program: String,
}

impl Default for FfmpegAudioExtractor {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract(
        &self,
        video_path: &Path,
        audio_path: &Path,
    ) -> Result<(), TranscriptionError> {
        let output = Command::new(&self.program)
            .arg("-y")
            .arg("-i")
            .arg(video_path)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg(SAMPLE_RATE.to_string())
            .arg("-ac")
            .arg("1")
            .arg(audio_path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TranscriptionError::AudioExtractionFailed {
                video_path: video_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(TranscriptionError::AudioExtractionFailed {
                video_path: video_path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(())
    }
}

/// Read a 16 kHz WAV file as mono `f32` samples in `[-1, 1]`.
pub fn load_wav(audio_path: &Path) -> Result<Vec<f32>, TranscriptionError> {
    let unreadable = |reason: String| TranscriptionError::AudioUnreadable {
        audio_path: audio_path.to_path_buf(),
        reason,
    };

    let mut reader = hound::WavReader::open(audio_path).map_err(|e| unreadable(e.to_string()))?;
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE {
        return Err(TranscriptionError::UnexpectedSampleRate(spec.sample_rate));
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<_, _>>(),
        (hound::SampleFormat::Int, bits) if (1..=32).contains(&bits) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
        }
        (hound::SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>(),
        (format, bits) => {
            return Err(unreadable(format!(
                "unsupported sample format {format:?} at {bits} bits"
            )));
        }
    }
    .map_err(|e| unreadable(e.to_string()))?;

    let channels = spec.channels.max(1) as usize;
    debug!(
        path = %audio_path.display(),
        samples = interleaved.len(),
        channels,
        "loaded audio"
    );
    Ok(downmix(&interleaved, channels))
}

/// Average interleaved channels into one.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Sample ranges of `window_seconds` advancing by `window - overlap`.
/// The last window is truncated to the audio length.
pub fn chunk_windows(
    total_samples: usize,
    sample_rate: u32,
    window_seconds: f64,
    overlap_seconds: f64,
) -> Vec<Range<usize>> {
    let window = ((window_seconds * sample_rate as f64) as usize).max(1);
    let overlap = (overlap_seconds.max(0.0) * sample_rate as f64) as usize;
    let step = if overlap < window { window - overlap } else { window };

    let mut windows = Vec::new();
    let mut start = 0;
    while start < total_samples {
        let end = (start + window).min(total_samples);
        windows.push(start..end);
        if end == total_samples {
            break;
        }
        start += step;
    }
    windows
}
