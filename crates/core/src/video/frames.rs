//! Lazy, finite, non-restartable stream of decoded RGB frames.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use tracing::warn;

use crate::error::{AttentionError, FrameError};

pub type Frame = image::RgbImage;

/// Consecutive decode failures tolerated before the stream gives up.
const MAX_CONSECUTIVE_ERRORS: usize = 64;

/// A sequential frame decoder. Each item is one frame, or the reason that
/// frame could not be decoded.
pub trait FrameSource: Iterator<Item = Result<Frame, FrameError>> {
    /// Nominal frame rate reported by the container, if any.
    fn fps(&self) -> Option<f64>;
}

/// Opens a video for sequential decoding. Failing to open is fatal for that
/// video only.
pub trait VideoOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, AttentionError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum Phase {
    #[default]
    Reading,
    Draining,
    Done,
}

/// Read/drain bookkeeping for the packet loop.
#[derive(Debug, Default)]
struct StreamState {
    phase: Phase,
    consecutive_errors: usize,
}

impl StreamState {
    /// Returns true when the error budget is spent while still reading.
    fn frame_failed(&mut self) -> bool {
        self.consecutive_errors += 1;
        self.consecutive_errors > MAX_CONSECUTIVE_ERRORS && self.phase == Phase::Reading
    }

    fn frame_ok(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Input is exhausted or unreadable. Returns true only on the first call,
    /// when the decoder still has to be sent EOF.
    fn input_ended(&mut self) -> bool {
        if self.phase == Phase::Reading {
            self.phase = Phase::Draining;
            true
        } else {
            false
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Done;
    }
}

pub struct FfmpegOpener;

impl FfmpegOpener {
    pub fn new() -> Result<Self, ffmpeg::Error> {
        ffmpeg::init()?;
        ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
        Ok(Self)
    }
}

impl VideoOpener for FfmpegOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, AttentionError> {
        Ok(Box::new(FfmpegFrames::open(path)?))
    }
}

pub struct FfmpegFrames {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    fps: Option<f64>,
    state: StreamState,
}

fn unreadable(reason: impl ToString) -> AttentionError {
    AttentionError::VideoUnreadable {
        reason: reason.to_string(),
    }
}

impl FfmpegFrames {
    pub fn open(path: &Path) -> Result<Self, AttentionError> {
        let input = ffmpeg::format::input(path).map_err(unreadable)?;

        let (stream_index, fps, parameters) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| unreadable("no video stream"))?;
            let rate = stream.avg_frame_rate();
            let fps = (rate.denominator() > 0)
                .then(|| f64::from(rate.numerator()) / f64::from(rate.denominator()));
            (stream.index(), fps, stream.parameters())
        };

        let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
            .map_err(unreadable)?
            .decoder()
            .video()
            .map_err(unreadable)?;

        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(unreadable)?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            fps,
            state: StreamState::default(),
        })
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame, FrameError> {
        let mut rgb = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb)
            .map_err(|e| FrameError::Convert(e.to_string()))?;

        let (width, height) = (rgb.width(), rgb.height());
        let stride = rgb.stride(0);
        let row_bytes = width as usize * 3;
        let data = rgb.data(0);

        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let line = data
                .get(start..start + row_bytes)
                .ok_or_else(|| FrameError::Convert("frame buffer shorter than expected".into()))?;
            pixels.extend_from_slice(line);
        }

        Frame::from_raw(width, height, pixels)
            .ok_or_else(|| FrameError::Convert("pixel buffer size mismatch".into()))
    }

    /// Report a frame the decoder or scaler could not produce. Once too many
    /// fail in a row, stop reading and flush what the decoder still holds.
    fn fail(&mut self, err: FrameError) -> Option<Result<Frame, FrameError>> {
        if self.state.frame_failed() {
            warn!(limit = MAX_CONSECUTIVE_ERRORS, "too many undecodable frames, flushing decoder");
            self.begin_drain();
        }
        Some(Err(err))
    }

    fn begin_drain(&mut self) {
        if self.state.input_ended() && self.decoder.send_eof().is_err() {
            self.state.finish();
        }
    }
}

impl Iterator for FfmpegFrames {
    type Item = Result<Frame, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.state.phase == Phase::Done {
                return None;
            }

            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    return match self.convert(&decoded) {
                        Ok(frame) => {
                            self.state.frame_ok();
                            Some(Ok(frame))
                        }
                        Err(e) => self.fail(e),
                    };
                }
                Err(ffmpeg::Error::Eof) => {
                    self.state.finish();
                    return None;
                }
                // Anything else means the decoder wants more input.
                Err(_) if self.state.phase == Phase::Draining => {
                    self.state.finish();
                    return None;
                }
                Err(_) => {}
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(e) = self.decoder.send_packet(&packet) {
                        return self.fail(FrameError::Decode(e.to_string()));
                    }
                }
                Err(ffmpeg::Error::Eof) => self.begin_drain(),
                // A broken container is not a frame; keep what was decoded so far.
                Err(e) => {
                    warn!(error = %e, "demuxer read failed, flushing decoder");
                    self.begin_drain();
                }
            }
        }
    }
}

impl FrameSource for FfmpegFrames {
    fn fps(&self) -> Option<f64> {
        self.fps
    }
}
