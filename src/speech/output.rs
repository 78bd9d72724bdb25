//! Speech output adapter.
//!
//! Reads one translation aloud in its own language.  The adapter keeps the
//! current utterance alive until it finishes or is replaced, so the engine
//! never loses it mid-playback, and cancels the previous one before the
//! next is queued so two utterances are never audible together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{primary_subtag, SpeechError};
use crate::config::SpeechOutputConfig;

// ---------------------------------------------------------------------------
// Engine seam
// ---------------------------------------------------------------------------

/// One installed voice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// BCP-47 style tag, e.g. `vi-VN` or `en-us`.
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// Everything the engine needs to render one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub lang: String,
    /// `None` lets the engine pick its default voice for `lang`.
    pub voice: Option<Voice>,
    pub volume: f32,
    pub rate: f32,
}

/// Terminal event of one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Finished,
    /// Cut short by a cancel or by the next utterance.
    Interrupted,
    /// Dropped by the engine before playback started.
    Canceled,
    Failed(String),
}

/// Text-to-speech engine.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Voices known right now.  May be empty until the engine has loaded.
    fn voices(&self) -> Vec<Voice>;

    /// Resolves when the voice list changes.  Engines with a fixed list
    /// never resolve.
    async fn voices_changed(&self);

    /// Start playback.  The receiver yields exactly one terminal event.
    fn speak(&self, utterance: Arc<Utterance>)
        -> Result<oneshot::Receiver<SynthesisEvent>, SpeechError>;

    /// Stop whatever is playing.
    fn cancel(&self);
}

// ---------------------------------------------------------------------------
// Voice selection
// ---------------------------------------------------------------------------

fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

/// Pick a voice for `lang`: exact tag match first, then any voice sharing
/// the primary subtag.  `None` means "use the engine default".
pub fn select_voice<'a>(voices: &'a [Voice], lang: &str) -> Option<&'a Voice> {
    let wanted = normalize_tag(lang);
    if wanted.is_empty() {
        return None;
    }
    if let Some(exact) = voices.iter().find(|v| normalize_tag(&v.lang) == wanted) {
        return Some(exact);
    }
    let primary = primary_subtag(&wanted);
    voices.iter().find(|v| primary_subtag(&v.lang) == primary)
}

// ---------------------------------------------------------------------------
// SpeechOutput
// ---------------------------------------------------------------------------

/// Playback parameters applied to every utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSettings {
    pub volume: f32,
    pub rate: f32,
    /// How long to wait for a late voice list before falling back.
    pub voice_wait: Duration,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self::from(&SpeechOutputConfig::default())
    }
}

impl From<&SpeechOutputConfig> for VoiceSettings {
    fn from(cfg: &SpeechOutputConfig) -> Self {
        Self {
            volume: cfg.volume.clamp(0.0, 1.0),
            rate: cfg.rate.max(0.1),
            voice_wait: Duration::from_millis(cfg.voice_wait_ms),
        }
    }
}

/// How a `speak` call ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    Completed,
    /// Replaced by a newer utterance or canceled by reset.
    Interrupted,
}

pub struct SpeechOutput {
    engine: Option<Arc<dyn SpeechSynthesizer>>,
    settings: VoiceSettings,
    live: Mutex<Option<Arc<Utterance>>>,
    /// Bumped by every [`SpeechOutput::cancel`]; a `speak` that started
    /// under an older value never reaches the engine.
    cancel_epoch: AtomicU64,
}

impl SpeechOutput {
    pub fn new(engine: Option<Arc<dyn SpeechSynthesizer>>, settings: VoiceSettings) -> Self {
        Self {
            engine,
            settings,
            live: Mutex::new(None),
            cancel_epoch: AtomicU64::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(None, VoiceSettings::default())
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    fn live(&self) -> MutexGuard<'_, Option<Arc<Utterance>>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True while an utterance is playing.
    pub fn is_speaking(&self) -> bool {
        self.live().is_some()
    }

    /// Speak `text` with a voice for `lang` and wait until playback ends.
    pub async fn speak(&self, text: &str, lang: &str) -> Result<SpeechOutcome, SpeechError> {
        let engine = self
            .engine
            .as_ref()
            .ok_or(SpeechError::UnsupportedCapability("speech synthesis"))?;

        let epoch = self.cancel_epoch.load(Ordering::SeqCst);
        let voice = self.resolve_voice(engine.as_ref(), lang).await;
        if voice.is_none() {
            log::debug!("speech: no voice for {lang}, using engine default");
        }

        let utterance = Arc::new(Utterance {
            text: text.to_string(),
            lang: lang.to_string(),
            voice,
            volume: self.settings.volume,
            rate: self.settings.rate,
        });

        let rx = {
            let mut live = self.live();
            if self.cancel_epoch.load(Ordering::SeqCst) != epoch {
                log::debug!("speech: canceled before playback started");
                return Ok(SpeechOutcome::Interrupted);
            }
            if live.take().is_some() {
                engine.cancel();
            }
            let rx = engine.speak(Arc::clone(&utterance))?;
            *live = Some(Arc::clone(&utterance));
            rx
        };

        let event = rx.await.unwrap_or(SynthesisEvent::Interrupted);

        {
            let mut live = self.live();
            if live.as_ref().is_some_and(|u| Arc::ptr_eq(u, &utterance)) {
                *live = None;
            }
        }

        match event {
            SynthesisEvent::Finished => Ok(SpeechOutcome::Completed),
            SynthesisEvent::Interrupted | SynthesisEvent::Canceled => {
                Ok(SpeechOutcome::Interrupted)
            }
            SynthesisEvent::Failed(message) => {
                log::warn!("speech: synthesis failed for {lang}: {message}");
                Err(SpeechError::Synthesis(message))
            }
        }
    }

    /// Stop playback and release the current utterance.
    pub fn cancel(&self) {
        if let Some(engine) = &self.engine {
            let mut live = self.live();
            self.cancel_epoch.fetch_add(1, Ordering::SeqCst);
            live.take();
            engine.cancel();
        }
    }

    async fn resolve_voice(&self, engine: &dyn SpeechSynthesizer, lang: &str) -> Option<Voice> {
        let mut voices = engine.voices();
        if voices.is_empty() {
            match tokio::time::timeout(self.settings.voice_wait, engine.voices_changed()).await {
                Ok(()) => voices = engine.voices(),
                Err(_) => log::debug!("speech: voice list still empty after wait"),
            }
        }
        select_voice(&voices, lang).cloned()
    }
}

// ---------------------------------------------------------------------------
// MockSynthesizer  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum SynthCall {
    Speak(Arc<Utterance>),
    Cancel,
}

/// Test double.  In hold mode each utterance stays audible until canceled
/// or [`MockSynthesizer::finish`]; otherwise it finishes immediately.
#[cfg(test)]
pub struct MockSynthesizer {
    voices: Mutex<Vec<Voice>>,
    voices_ready: tokio::sync::Notify,
    hold: bool,
    fail_with: Option<String>,
    playing: Mutex<Option<oneshot::Sender<SynthesisEvent>>>,
    pub calls: Mutex<Vec<SynthCall>>,
    pub overlaps: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockSynthesizer {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self {
            voices: Mutex::new(voices),
            voices_ready: tokio::sync::Notify::new(),
            hold: false,
            fail_with: None,
            playing: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            overlaps: Default::default(),
        }
    }

    pub fn holding(voices: Vec<Voice>) -> Self {
        Self {
            hold: true,
            ..Self::new(voices)
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Self::new(vec![])
        }
    }

    pub fn publish_voices(&self, voices: Vec<Voice>) {
        *self.voices.lock().unwrap() = voices;
        self.voices_ready.notify_one();
    }

    pub fn finish(&self) {
        if let Some(tx) = self.playing.lock().unwrap().take() {
            let _ = tx.send(SynthesisEvent::Finished);
        }
    }

    pub fn calls(&self) -> Vec<SynthCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn spoken(&self) -> Vec<Arc<Utterance>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SynthCall::Speak(u) => Some(u),
                SynthCall::Cancel => None,
            })
            .collect()
    }

    pub fn cancel_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SynthCall::Cancel))
            .count()
    }
}

#[cfg(test)]
#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices.lock().unwrap().clone()
    }

    async fn voices_changed(&self) {
        self.voices_ready.notified().await;
    }

    fn speak(
        &self,
        utterance: Arc<Utterance>,
    ) -> Result<oneshot::Receiver<SynthesisEvent>, SpeechError> {
        self.calls.lock().unwrap().push(SynthCall::Speak(utterance));
        let (tx, rx) = oneshot::channel();
        if let Some(message) = &self.fail_with {
            let _ = tx.send(SynthesisEvent::Failed(message.clone()));
        } else if self.hold {
            let mut playing = self.playing.lock().unwrap();
            if playing.is_some() {
                self.overlaps
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
            *playing = Some(tx);
        } else {
            let _ = tx.send(SynthesisEvent::Finished);
        }
        Ok(rx)
    }

    fn cancel(&self) {
        self.calls.lock().unwrap().push(SynthCall::Cancel);
        if let Some(tx) = self.playing.lock().unwrap().take() {
            let _ = tx.send(SynthesisEvent::Interrupted);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
