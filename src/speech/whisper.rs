//! Offline speech recognition: microphone → endpointing → whisper.cpp.
//!
//! One session captures from the default input device on a dedicated
//! thread until the speaker pauses (or the session hits its length cap or
//! is stopped), resamples to 16 kHz and runs a single whisper pass in the
//! session locale's language.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rubato::{FftFixedIn, Resampler};
use thiserror::Error;
use tokio::sync::oneshot;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::input::{RecognitionEvent, SpeechRecognizer};
use super::{primary_subtag, SpeechError};
use crate::config::SpeechInputConfig;

/// Whisper expects 16 kHz mono f32.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;
/// Below 0.5 s whisper output is unreliable; treat as "no speech".
const MIN_AUDIO_SAMPLES: usize = 8_000;
/// Endpointing frame length.
const FRAME_MS: u32 = 30;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no audio input device found")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("resampling failed: {0}")]
    Resample(String),
}

// ---------------------------------------------------------------------------
// Endpointer
// ---------------------------------------------------------------------------

/// Energy-based end-of-utterance detection over mono samples.
///
/// The utterance ends once speech has been heard and is followed by
/// `end_silence` of frames under the RMS threshold, or when the total
/// length reaches the cap.
#[derive(Debug)]
pub struct Endpointer {
    threshold: f32,
    frame_len: usize,
    end_silence_frames: usize,
    max_samples: usize,
    pending: Vec<f32>,
    audio: Vec<f32>,
    heard_speech: bool,
    silent_run: usize,
}

impl Endpointer {
    pub fn new(sample_rate: u32, cfg: &SpeechInputConfig) -> Self {
        let frame_len = ((sample_rate * FRAME_MS) / 1000).max(1) as usize;
        let end_silence_frames =
            ((cfg.end_silence_secs.max(0.0) * 1000.0) / FRAME_MS as f32).ceil() as usize;
        Self {
            threshold: cfg.energy_threshold,
            frame_len,
            end_silence_frames: end_silence_frames.max(1),
            max_samples: (cfg.max_utterance_secs.max(0.0) * sample_rate as f32) as usize,
            pending: Vec::new(),
            audio: Vec::new(),
            heard_speech: false,
            silent_run: 0,
        }
    }

    pub fn push(&mut self, mono: &[f32]) {
        self.pending.extend_from_slice(mono);
        while self.pending.len() >= self.frame_len {
            let frame: Vec<f32> = self.pending.drain(..self.frame_len).collect();
            if rms(&frame) > self.threshold {
                self.heard_speech = true;
                self.silent_run = 0;
            } else if self.heard_speech {
                self.silent_run += 1;
            }
            self.audio.extend_from_slice(&frame);
        }
    }

    pub fn heard_speech(&self) -> bool {
        self.heard_speech
    }

    pub fn finished(&self) -> bool {
        (self.heard_speech && self.silent_run >= self.end_silence_frames)
            || self.audio.len() >= self.max_samples
    }

    /// Captured audio, or empty when no frame ever crossed the threshold.
    pub fn into_audio(self) -> Vec<f32> {
        if self.heard_speech {
            self.audio
        } else {
            Vec::new()
        }
    }
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// Average interleaved channels into one.
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Resample mono audio to 16 kHz with rubato's FFT resampler.
pub fn resample_to_16k(samples: &[f32], source_rate: u32) -> Result<Vec<f32>, CaptureError> {
    if source_rate == WHISPER_SAMPLE_RATE || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        WHISPER_SAMPLE_RATE as usize,
        1024,
        2,
        1,
    )
    .map_err(|e| CaptureError::Resample(e.to_string()))?;

    let expected = samples.len() * WHISPER_SAMPLE_RATE as usize / source_rate as usize;
    let mut out = Vec::with_capacity(expected + 1024);
    let mut pos = 0;

    while samples.len() - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let block: &[&[f32]] = &[&samples[pos..pos + n]];
        let frames = resampler
            .process(block, None)
            .map_err(|e| CaptureError::Resample(e.to_string()))?;
        out.extend_from_slice(&frames[0]);
        pos += n;
    }
    if pos < samples.len() {
        let tail: &[&[f32]] = &[&samples[pos..]];
        let frames = resampler
            .process_partial(Some(tail), None)
            .map_err(|e| CaptureError::Resample(e.to_string()))?;
        out.extend_from_slice(&frames[0]);
    }

    // Drop the resampler's trailing padding.
    out.truncate(expected.max(1));
    Ok(out)
}

// ---------------------------------------------------------------------------
// WhisperRecognizer
// ---------------------------------------------------------------------------

struct WhisperModel {
    ctx: WhisperContext,
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
// weights are read-only after loading and each pass creates its own state.
unsafe impl Send for WhisperModel {}
unsafe impl Sync for WhisperModel {}

pub struct WhisperRecognizer {
    model: Arc<WhisperModel>,
    config: SpeechInputConfig,
    stop: Arc<AtomicBool>,
}

impl WhisperRecognizer {
    /// Load a GGML model.  Fails when the file is missing or unreadable.
    pub fn load(model_path: &Path, config: SpeechInputConfig) -> Result<Self, SpeechError> {
        if !model_path.exists() {
            return Err(SpeechError::Recognition(format!(
                "model not found: {}",
                model_path.display()
            )));
        }
        let path_str = model_path.to_str().ok_or_else(|| {
            SpeechError::Recognition(format!(
                "model path contains non-UTF-8 characters: {}",
                model_path.display()
            ))
        })?;

        let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
            .map_err(|e| SpeechError::Recognition(e.to_string()))?;
        log::info!("speech: whisper model loaded from {}", model_path.display());

        Ok(Self {
            model: Arc::new(WhisperModel { ctx }),
            config,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn start(&self, locale: &str) -> Result<oneshot::Receiver<RecognitionEvent>, SpeechError> {
        self.stop.store(false, Ordering::SeqCst);

        let (tx, rx) = oneshot::channel();
        let model = Arc::clone(&self.model);
        let config = self.config.clone();
        let stop = Arc::clone(&self.stop);
        let language = primary_subtag(locale);

        std::thread::Builder::new()
            .name("speech-capture".into())
            .spawn(move || {
                let event = match capture_utterance(&config, &stop) {
                    Ok(audio) if audio.len() < MIN_AUDIO_SAMPLES => RecognitionEvent::End,
                    Ok(audio) => match transcribe(&model.ctx, &language, &audio) {
                        Ok(text) => RecognitionEvent::Final(text),
                        Err(e) => RecognitionEvent::Error(e),
                    },
                    Err(e) => RecognitionEvent::Error(e.to_string()),
                };
                let _ = tx.send(event);
            })
            .map_err(|e| SpeechError::Recognition(format!("failed to start capture: {e}")))?;

        Ok(rx)
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Record from the default microphone until the endpointer fires.
/// Returns 16 kHz mono audio.
fn capture_utterance(cfg: &SpeechInputConfig, stop: &AtomicBool) -> Result<Vec<f32>, CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
    let supported = device.default_input_config()?;
    let channels = supported.channels();
    let sample_rate = supported.sample_rate().0;
    let config: cpal::StreamConfig = supported.into();

    let (tx, rx) = mpsc::channel::<Vec<f32>>();
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            let _ = tx.send(data.to_vec());
        },
        |err: cpal::StreamError| {
            log::error!("cpal stream error: {err}");
        },
        None,
    )?;
    stream.play()?;

    let mut endpointer = Endpointer::new(sample_rate, cfg);
    let deadline = Instant::now() + Duration::from_secs_f32(cfg.max_utterance_secs.max(0.0));

    loop {
        if stop.load(Ordering::SeqCst) || Instant::now() >= deadline {
            break;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(chunk) => {
                endpointer.push(&downmix(&chunk, channels));
                if endpointer.finished() {
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    drop(stream);

    log::debug!(
        "speech: capture ended (speech heard: {})",
        endpointer.heard_speech()
    );
    resample_to_16k(&endpointer.into_audio(), sample_rate)
}

fn transcribe(ctx: &WhisperContext, language: &str, audio: &[f32]) -> Result<String, String> {
    let mut fp = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
    fp.set_language(Some(language));
    fp.set_n_threads(optimal_threads());
    fp.set_print_progress(false);
    fp.set_print_realtime(false);

    let mut state = ctx.create_state().map_err(|e| e.to_string())?;
    state.full(fp, audio).map_err(|e| e.to_string())?;

    let n_segments = state.full_n_segments().map_err(|e| e.to_string())?;
    let mut text = String::new();
    for i in 0..n_segments {
        let segment = state
            .full_get_segment_text(i)
            .map_err(|e| format!("segment {i}: {e}"))?;
        text.push_str(&segment);
    }
    Ok(text.trim().to_string())
}

fn optimal_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
