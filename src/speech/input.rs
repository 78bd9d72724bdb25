//! Speech input adapter.
//!
//! [`SpeechRecognizer`] is the engine seam: `start` opens one
//! single-utterance session whose receiver yields exactly one terminal
//! [`RecognitionEvent`].  [`SpeechInput`] owns the Idle/Listening state,
//! refuses a second concurrent session and turns the terminal event into a
//! trimmed transcript.
//!
//! ```text
//! Idle ──listen──▶ Listening ──Final(text)──▶ Idle  (returns Some(text))
//!                           ──End / stop────▶ Idle  (returns None)
//!                           ──Error─────────▶ Idle  (returns Err)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use super::SpeechError;

// ---------------------------------------------------------------------------
// Engine seam
// ---------------------------------------------------------------------------

/// Terminal event of one recognition session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Final transcript of the utterance.
    Final(String),
    /// Engine error (no microphone, model failure, …).
    Error(String),
    /// Session ended without a result.
    End,
}

/// Single-utterance speech-to-text engine.
pub trait SpeechRecognizer: Send + Sync {
    /// Begin listening.  A dropped sender is treated as [`RecognitionEvent::End`].
    fn start(&self, locale: &str) -> Result<oneshot::Receiver<RecognitionEvent>, SpeechError>;

    /// Ask the running session to end early.  Must be a no-op when idle.
    fn stop(&self);
}

// ---------------------------------------------------------------------------
// SpeechInput
// ---------------------------------------------------------------------------

/// Clears the listening flag when the session ends, however it ends.
struct SessionGuard<'a>(&'a AtomicBool);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SpeechInput {
    engine: Option<Arc<dyn SpeechRecognizer>>,
    locale: String,
    listening: AtomicBool,
}

impl SpeechInput {
    pub fn new(engine: Option<Arc<dyn SpeechRecognizer>>, locale: impl Into<String>) -> Self {
        Self {
            engine,
            locale: locale.into(),
            listening: AtomicBool::new(false),
        }
    }

    /// An adapter for hosts without speech recognition.
    pub fn unavailable() -> Self {
        Self::new(None, "ko-KR")
    }

    pub fn is_supported(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Listen for one utterance.
    ///
    /// Returns `Ok(Some(transcript))` with surrounding whitespace removed,
    /// `Ok(None)` when the session ended without speech.
    pub async fn listen(&self) -> Result<Option<String>, SpeechError> {
        let engine = self
            .engine
            .as_ref()
            .ok_or(SpeechError::UnsupportedCapability("speech recognition"))?;

        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(SpeechError::Busy);
        }
        let _session = SessionGuard(&self.listening);

        log::debug!("speech: listening ({})", self.locale);
        let rx = engine.start(&self.locale)?;
        let event = rx.await.unwrap_or(RecognitionEvent::End);

        match event {
            RecognitionEvent::Final(text) => {
                let text = text.trim();
                if text.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(text.to_string()))
                }
            }
            RecognitionEvent::End => Ok(None),
            RecognitionEvent::Error(message) => {
                log::warn!("speech: recognition error: {message}");
                Err(SpeechError::Recognition(message))
            }
        }
    }

    /// End the running session early.  Safe to call at any time.
    pub fn stop(&self) {
        if !self.is_listening() {
            return;
        }
        if let Some(engine) = &self.engine {
            engine.stop();
        }
    }
}

// ---------------------------------------------------------------------------
// MockRecognizer  (test-only)
// ---------------------------------------------------------------------------

/// Test double.  With a scripted event the session ends immediately;
/// without one it stays open until [`SpeechRecognizer::stop`] or
/// [`MockRecognizer::say`].
#[cfg(test)]
pub struct MockRecognizer {
    scripted: Option<RecognitionEvent>,
    pending: std::sync::Mutex<Option<oneshot::Sender<RecognitionEvent>>>,
    pub starts: std::sync::atomic::AtomicUsize,
    pub stops: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockRecognizer {
    pub fn scripted(event: RecognitionEvent) -> Self {
        Self {
            scripted: Some(event),
            pending: std::sync::Mutex::new(None),
            starts: Default::default(),
            stops: Default::default(),
        }
    }

    pub fn held() -> Self {
        Self {
            scripted: None,
            pending: std::sync::Mutex::new(None),
            starts: Default::default(),
            stops: Default::default(),
        }
    }

    /// Deliver a final transcript to the open session.
    pub fn say(&self, text: &str) {
        if let Some(tx) = self.pending.lock().unwrap().take() {
            let _ = tx.send(RecognitionEvent::Final(text.into()));
        }
    }
}

#[cfg(test)]
impl SpeechRecognizer for MockRecognizer {
    fn start(&self, _locale: &str) -> Result<oneshot::Receiver<RecognitionEvent>, SpeechError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        match &self.scripted {
            Some(event) => {
                let _ = tx.send(event.clone());
            }
            None => *self.pending.lock().unwrap() = Some(tx),
        }
        Ok(rx)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.pending.lock().unwrap().take() {
            let _ = tx.send(RecognitionEvent::End);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn input_with(engine: MockRecognizer) -> (SpeechInput, Arc<MockRecognizer>) {
        let engine = Arc::new(engine);
        let input = SpeechInput::new(Some(engine.clone() as Arc<dyn SpeechRecognizer>), "ko-KR");
        (input, engine)
    }

    #[tokio::test]
    async fn unsupported_platform_reports_capability_error() {
        let input = SpeechInput::unavailable();
        assert!(!input.is_supported());
        assert_eq!(
            input.listen().await,
            Err(SpeechError::UnsupportedCapability("speech recognition"))
        );
        // Stopping with no engine is harmless.
        input.stop();
    }

    #[tokio::test]
    async fn final_result_is_trimmed() {
        let (input, _) = input_with(MockRecognizer::scripted(RecognitionEvent::Final(
            "  반생이 챙겨서 올라가  ".into(),
        )));
        assert_eq!(input.listen().await.unwrap().as_deref(), Some("반생이 챙겨서 올라가"));
        assert!(!input.is_listening());
    }

    #[tokio::test]
    async fn blank_final_and_end_yield_none() {
        let (input, _) = input_with(MockRecognizer::scripted(RecognitionEvent::Final("  ".into())));
        assert_eq!(input.listen().await.unwrap(), None);

        let (input, _) = input_with(MockRecognizer::scripted(RecognitionEvent::End));
        assert_eq!(input.listen().await.unwrap(), None);
    }

    #[tokio::test]
    async fn engine_error_returns_to_idle() {
        let (input, _) = input_with(MockRecognizer::scripted(RecognitionEvent::Error(
            "not-allowed".into(),
        )));
        assert_eq!(
            input.listen().await,
            Err(SpeechError::Recognition("not-allowed".into()))
        );
        assert!(!input.is_listening());
    }

    #[tokio::test]
    async fn second_session_is_refused_and_stop_ends_the_first() {
        let (input, engine) = input_with(MockRecognizer::held());

        let (first, second) = tokio::join!(input.listen(), async {
            tokio::task::yield_now().await;
            assert!(input.is_listening());
            let second = input.listen().await;
            input.stop();
            second
        });

        assert_eq!(second, Err(SpeechError::Busy));
        assert_eq!(first, Ok(None));
        assert_eq!(engine.starts.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
        assert!(!input.is_listening());
    }

    #[tokio::test]
    async fn stop_when_idle_does_not_reach_engine() {
        let (input, engine) = input_with(MockRecognizer::held());
        input.stop();
        input.stop();
        assert_eq!(engine.stops.load(Ordering::SeqCst), 0);
    }
}
