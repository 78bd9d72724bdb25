//! Request lifecycle state and the session state shared with the front-end.
//!
//! [`RequestState`] drives the orchestrator's state machine.  The front-end
//! reads it via [`SharedState`] to decide what to render.
//!
//! [`SessionState`] is the single source of truth for everything the
//! front-end needs: request phase, active mode, the last dictated
//! transcript and the inline speech warning.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<SessionState>>`, cheap to
//! clone and safe to share across tasks.

use std::sync::{Arc, Mutex};

use crate::llm::{GenerationMode, GenerationResult};

// ---------------------------------------------------------------------------
// ErrorDetail
// ---------------------------------------------------------------------------

/// User-visible failure of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Single message, already prefixed with the mode label.
    pub message: String,
    /// The stored key was missing or rejected; the front-end should ask
    /// for a new one.
    pub credential_required: bool,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            credential_required: false,
        }
    }

    pub fn credential(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            credential_required: true,
        }
    }
}

// ---------------------------------------------------------------------------
// RequestState
// ---------------------------------------------------------------------------

/// States of one generation request.
///
/// ```text
/// Idle ──submit(non-blank)──▶ Loading ──normalize ok──▶ Succeeded
///                                     ──any failure───▶ Failed
/// Succeeded / Failed ──submit──▶ Loading
/// any state ──reset──▶ Idle
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    /// One completion call is in flight; further submissions are rejected.
    Loading,
    Succeeded(GenerationResult),
    Failed(ErrorDetail),
}

impl RequestState {
    /// ```
    /// use global_foreman::pipeline::RequestState;
    ///
    /// assert!(RequestState::Loading.is_busy());
    /// assert!(!RequestState::Idle.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(self, RequestState::Loading)
    }

    /// Short label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            RequestState::Idle => "Idle",
            RequestState::Loading => "Loading",
            RequestState::Succeeded(_) => "Done",
            RequestState::Failed(_) => "Error",
        }
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        match self {
            RequestState::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorDetail> {
        match self {
            RequestState::Failed(detail) => Some(detail),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

pub struct SessionState {
    /// Current phase of the request lifecycle.
    pub request: RequestState,

    /// Which app variant new submissions use.
    pub mode: GenerationMode,

    /// Last dictated transcript, shown in the input field.
    pub transcript: String,

    /// Inline, non-blocking speech warning.  Never a request failure.
    pub speech_warning: Option<String>,

    /// Bumped by every submit and reset; a completion that returns under
    /// an older value is stale and must be dropped.
    pub(crate) generation: u64,
}

impl SessionState {
    pub fn new(mode: GenerationMode) -> Self {
        Self {
            request: RequestState::Idle,
            mode,
            transcript: String::new(),
            speech_warning: None,
            generation: 0,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(GenerationMode::default())
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`SessionState`].
///
/// Lock for a short critical section only; never hold the guard across an
/// `.await`.
pub type SharedState = Arc<Mutex<SessionState>>;

pub fn new_shared_state(mode: GenerationMode) -> SharedState {
    Arc::new(Mutex::new(SessionState::new(mode)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{DreamResult, GenerationResult};

    #[test]
    fn only_loading_is_busy() {
        assert!(!RequestState::Idle.is_busy());
        assert!(RequestState::Loading.is_busy());
        assert!(!RequestState::Failed(ErrorDetail::new("x")).is_busy());
    }

    #[test]
    fn labels() {
        assert_eq!(RequestState::Idle.label(), "Idle");
        assert_eq!(RequestState::Loading.label(), "Loading");
        assert_eq!(RequestState::Failed(ErrorDetail::new("x")).label(), "Error");
    }

    #[test]
    fn accessors_match_variant() {
        let result = GenerationResult::DreamInterpretation(DreamResult {
            title: String::new(),
            interpretation: "길몽".into(),
            lucky_numbers: vec![3, 7],
            image_prompt: String::new(),
        });
        let ok = RequestState::Succeeded(result.clone());
        assert_eq!(ok.result(), Some(&result));
        assert!(ok.error().is_none());

        let failed = RequestState::Failed(ErrorDetail::credential("키 필요"));
        assert!(failed.error().unwrap().credential_required);
        assert!(failed.result().is_none());
    }

    #[test]
    fn new_session_is_idle() {
        let state = new_shared_state(GenerationMode::DreamInterpretation);
        let st = state.lock().unwrap();
        assert_eq!(st.request, RequestState::Idle);
        assert_eq!(st.mode, GenerationMode::DreamInterpretation);
        assert!(st.transcript.is_empty());
        assert!(st.speech_warning.is_none());
        assert_eq!(st.generation, 0);
    }
}
