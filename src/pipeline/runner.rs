//! Orchestrator: drives one request through prompt → completion → normalize
//! and coordinates the speech side channels around it.
//!
//! [`PipelineOrchestrator`] owns the [`SharedState`]; the front-end calls
//! its methods and reads the state back.
//!
//! # Request flow
//!
//! ```text
//! submit(text)
//!   ├─ blank                      → Ignored   (state untouched)
//!   ├─ Loading                    → Rejected
//!   └─ Loading
//!        ├─ no credential         → Failed { credential_required }
//!        ├─ client.complete       (await)
//!        │    ├─ 400/403          → invalidate key, Failed { credential_required }
//!        │    └─ other error      → Failed
//!        ├─ normalize
//!        │    ├─ ok               → Succeeded
//!        │    └─ error            → Failed
//!        └─ reset happened meanwhile → Discarded (post-reset state kept)
//! ```
//!
//! Speech failures only ever set `speech_warning`; they never change the
//! request state.

use std::sync::{Arc, MutexGuard};

use thiserror::Error;

use crate::config::{CredentialError, CredentialVault};
use crate::environment::{BrowserEnvironment, RedirectAffordance};
use crate::llm::{
    normalize, CompletionClient, CompletionError, GenerationMode, GenerationRequest,
    GenerationResult, NormalizeError, PromptBuilder,
};
use crate::speech::{SpeechError, SpeechInput, SpeechOutcome, SpeechOutput};

use super::state::{ErrorDetail, RequestState, SessionState, SharedState};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Everything that can fail a request.  Rendered after the mode prefix,
/// e.g. `통역 실패: API Error 500: Internal error`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("API 키가 설정되지 않았습니다.")]
    MissingCredential,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

impl PipelineError {
    /// The front-end should prompt for a new key.
    pub fn requires_credential(&self) -> bool {
        match self {
            PipelineError::MissingCredential => true,
            PipelineError::Completion(e) => e.is_invalid_credentials(),
            PipelineError::Normalize(_) => false,
        }
    }

    fn into_detail(self, mode: GenerationMode) -> ErrorDetail {
        let message = format!("{} 실패: {self}", mode.label());
        if self.requires_credential() {
            ErrorDetail::credential(message)
        } else {
            ErrorDetail::new(message)
        }
    }
}

// ---------------------------------------------------------------------------
// SubmitOutcome
// ---------------------------------------------------------------------------

/// What happened to one `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input; nothing was sent.
    Ignored,
    /// Another request was in flight.
    Rejected,
    /// The request finished and its result (or failure) is now the state.
    Applied,
    /// A reset happened while waiting; the late result was dropped.
    Discarded,
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

/// Sequences prompt building, the completion call and normalization, and
/// owns the credential and speech adapters.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use global_foreman::config::{ApiConfig, CredentialVault, MemoryCredentialStore};
/// use global_foreman::llm::{GeminiClient, GenerationMode};
/// use global_foreman::pipeline::{new_shared_state, PipelineOrchestrator};
///
/// # async fn example() {
/// let state = new_shared_state(GenerationMode::SafetyOrder);
/// let vault = CredentialVault::open(Box::new(MemoryCredentialStore::with_key("…")));
/// let client = Arc::new(GeminiClient::from_config(&ApiConfig::default()));
///
/// let orchestrator = PipelineOrchestrator::new(state.clone(), client, vault);
/// orchestrator.submit("반생이 챙겨서 2층으로 올라가").await;
/// println!("{}", state.lock().unwrap().request.label());
/// # }
/// ```
pub struct PipelineOrchestrator {
    state: SharedState,
    client: Arc<dyn CompletionClient>,
    credentials: CredentialVault,
    prompts: PromptBuilder,
    speech_in: SpeechInput,
    speech_out: SpeechOutput,
    environment: BrowserEnvironment,
}

impl PipelineOrchestrator {
    /// Create an orchestrator without speech engines and with an
    /// unrestricted host environment.
    pub fn new(
        state: SharedState,
        client: Arc<dyn CompletionClient>,
        credentials: CredentialVault,
    ) -> Self {
        Self {
            state,
            client,
            credentials,
            prompts: PromptBuilder::new(),
            speech_in: SpeechInput::unavailable(),
            speech_out: SpeechOutput::unavailable(),
            environment: BrowserEnvironment::from_user_agent(""),
        }
    }

    pub fn with_speech_input(mut self, speech_in: SpeechInput) -> Self {
        self.speech_in = speech_in;
        self
    }

    pub fn with_speech_output(mut self, speech_out: SpeechOutput) -> Self {
        self.speech_out = speech_out;
        self
    }

    pub fn with_environment(mut self, environment: BrowserEnvironment) -> Self {
        self.environment = environment;
        self
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Submit `text` in the current mode and wait for the outcome.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let (request, generation) = {
            let mut st = self.lock();
            let Some(request) = GenerationRequest::new(st.mode, text) else {
                return SubmitOutcome::Ignored;
            };
            if st.request.is_busy() {
                log::warn!("pipeline: submission rejected while a request is in flight");
                return SubmitOutcome::Rejected;
            }
            st.generation += 1;
            st.request = RequestState::Loading;
            (request, st.generation)
        };
        log::debug!("pipeline: {} request → Loading", request.mode.label());

        let outcome = self.run_request(&request).await;

        let mut st = self.lock();
        if st.generation != generation {
            log::debug!("pipeline: dropping stale {} result", request.mode.label());
            return SubmitOutcome::Discarded;
        }
        st.request = match outcome {
            Ok(result) => {
                log::info!("pipeline: {} succeeded: {}", result.mode().label(), result.title());
                RequestState::Succeeded(result)
            }
            Err(err) => {
                let detail = err.into_detail(request.mode);
                log::error!("pipeline error: {}", detail.message);
                RequestState::Failed(detail)
            }
        };
        SubmitOutcome::Applied
    }

    async fn run_request(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, PipelineError> {
        let key = self
            .credentials
            .current()
            .ok_or(PipelineError::MissingCredential)?;
        let prompt = self.prompts.build(request.mode, &request.user_text);

        let raw = match self.client.complete(&prompt, &key).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.is_invalid_credentials() && self.credentials.current().as_ref() == Some(&key) {
                    if let Err(store_err) = self.credentials.invalidate() {
                        log::error!("pipeline: could not clear rejected key: {store_err}");
                    }
                }
                return Err(e.into());
            }
        };

        Ok(normalize(&raw, request.mode)?)
    }

    /// Back to Idle: drop any pending result, clear the transcript and
    /// warning, stop speech in both directions.
    pub fn reset(&self) {
        {
            let mut st = self.lock();
            st.generation += 1;
            st.request = RequestState::Idle;
            st.transcript.clear();
            st.speech_warning = None;
        }
        self.speech_out.cancel();
        self.speech_in.stop();
        log::debug!("pipeline: reset → Idle");
    }

    /// Switch the mode for new submissions.  A shown result of the other
    /// mode is dropped so it is never rendered under the wrong variant.
    pub fn set_mode(&self, mode: GenerationMode) {
        let mut st = self.lock();
        st.mode = mode;
        if st.request.result().is_some_and(|r| r.mode() != mode) {
            st.request = RequestState::Idle;
        }
    }

    // -----------------------------------------------------------------------
    // Credential
    // -----------------------------------------------------------------------

    /// Persist and adopt a new key.
    pub fn set_credential(&self, value: &str) -> Result<(), CredentialError> {
        self.credentials.replace(value)
    }

    pub fn credentials(&self) -> &CredentialVault {
        &self.credentials
    }

    // -----------------------------------------------------------------------
    // Speech side channels
    // -----------------------------------------------------------------------

    /// Listen for one utterance and submit it.
    ///
    /// Returns `None` when nothing was heard or speech input failed; the
    /// failure is reported through `speech_warning`.
    pub async fn dictate(&self) -> Option<SubmitOutcome> {
        {
            let mut st = self.lock();
            if st.request.is_busy() {
                return Some(SubmitOutcome::Rejected);
            }
            st.speech_warning = None;
        }
        match self.speech_in.listen().await {
            Ok(Some(transcript)) => {
                self.lock().transcript = transcript.clone();
                Some(self.submit(&transcript).await)
            }
            Ok(None) => None,
            Err(e) => {
                self.warn_speech(&e);
                None
            }
        }
    }

    /// Read `text` aloud in `lang`.
    pub async fn speak(&self, text: &str, lang: &str) -> Option<SpeechOutcome> {
        self.lock().speech_warning = None;
        match self.speech_out.speak(text, lang).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.warn_speech(&e);
                None
            }
        }
    }

    /// Read the `index`-th translation of the current safety-order result.
    pub async fn speak_translation(&self, index: usize) -> Option<SpeechOutcome> {
        let entry = {
            let st = self.lock();
            match &st.request {
                RequestState::Succeeded(GenerationResult::SafetyOrder(r)) => {
                    r.translations.get(index).cloned()
                }
                _ => None,
            }
        }?;
        self.speak(&entry.text, &entry.lang).await
    }

    pub fn redirect_affordance(&self, page_url: &str) -> RedirectAffordance {
        self.environment.redirect_affordance(page_url)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn request_state(&self) -> RequestState {
        self.lock().request.clone()
    }

    pub fn mode(&self) -> GenerationMode {
        self.lock().mode
    }

    /// A speech-to-text engine is present; dictation is offered only then.
    pub fn can_listen(&self) -> bool {
        self.speech_in.is_supported()
    }

    /// A synthesizer is present; read-aloud is offered only then.
    pub fn can_speak(&self) -> bool {
        self.speech_out.is_supported()
    }

    pub fn speech_warning(&self) -> Option<String> {
        self.lock().speech_warning.clone()
    }

    pub fn transcript(&self) -> String {
        self.lock().transcript.clone()
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn warn_speech(&self, err: &SpeechError) {
        log::warn!("pipeline: speech: {err}");
        self.lock().speech_warning = Some(speech_warning_text(err));
    }
}

/// Inline warning shown for a speech failure.
pub fn speech_warning_text(err: &SpeechError) -> String {
    match err {
        SpeechError::UnsupportedCapability("speech recognition") => {
            "이 환경은 음성 인식을 지원하지 않습니다.".into()
        }
        SpeechError::UnsupportedCapability(_) => "이 환경은 음성 출력을 지원하지 않습니다.".into(),
        SpeechError::Busy => "이미 듣고 있습니다.".into(),
        SpeechError::Recognition(m) => format!("음성 인식 오류: {m}"),
        SpeechError::Synthesis(m) => format!("음성 출력 오류: {m}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, FileCredentialStore, MemoryCredentialStore};
    use crate::pipeline::state::new_shared_state;
    use crate::speech::{
        MockRecognizer, MockSynthesizer, RecognitionEvent, SpeechRecognizer, SpeechSynthesizer,
        Voice, VoiceSettings,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    // -----------------------------------------------------------------------
    // Test doubles
    // -----------------------------------------------------------------------

    const SAFETY_JSON: &str = r#"{
        "title": "자재 운반 지시",
        "safety_icon": "⛑️",
        "refined_text": "결속선을 챙겨서 2층으로 올라가세요. 안전모를 착용하세요.",
        "translations": [
            {"lang": "vi-VN", "lang_name": "베트남어", "text": "Mang dây buộc lên tầng 2.", "pronunciation": "망 저이 부옥 렌 떵 하이"}
        ]
    }"#;

    const DREAM_JSON: &str = "```json\n{\"title\":\"\",\"interpretation\":\"재물운이 들어옵니다.\",\"lucky_numbers\":[7,\"12\",45],\"image_prompt\":\"golden pig\"}\n```";

    /// Completion client that answers immediately, optionally after a gate
    /// is released, and records every prompt it sees.
    struct MockClient {
        response: Result<String, CompletionError>,
        gate: Option<Notify>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl MockClient {
        fn ok(body: &str) -> Self {
            Self {
                response: Ok(body.into()),
                gate: None,
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn err(error: CompletionError) -> Self {
            Self {
                response: Err(error),
                ..Self::ok("")
            }
        }

        fn gated(body: &str) -> Self {
            Self {
                gate: Some(Notify::new()),
                ..Self::ok(body)
            }
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl CompletionClient for MockClient {
        async fn complete(&self, prompt: &str, _key: &ApiKey) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.response.clone()
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn make_orchestrator(
        client: Arc<MockClient>,
        key: Option<&str>,
    ) -> (PipelineOrchestrator, SharedState) {
        let store = match key {
            Some(k) => MemoryCredentialStore::with_key(k),
            None => MemoryCredentialStore::default(),
        };
        let state = new_shared_state(GenerationMode::SafetyOrder);
        let orc = PipelineOrchestrator::new(
            Arc::clone(&state),
            client,
            CredentialVault::open(Box::new(store)),
        );
        (orc, state)
    }

    async fn yield_until(mut done: impl FnMut() -> bool) {
        while !done() {
            tokio::task::yield_now().await;
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn blank_submission_is_a_no_op() {
        let client = Arc::new(MockClient::ok(SAFETY_JSON));
        let (orc, state) = make_orchestrator(client.clone(), Some("k"));

        assert_eq!(orc.submit("   \n").await, SubmitOutcome::Ignored);
        assert_eq!(state.lock().unwrap().request, RequestState::Idle);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn safety_order_reaches_succeeded() {
        let client = Arc::new(MockClient::ok(SAFETY_JSON));
        let (orc, state) = make_orchestrator(client.clone(), Some("k"));

        assert_eq!(
            orc.submit("  반생이 챙겨서 2층으로 올라가 ").await,
            SubmitOutcome::Applied
        );

        assert!(client.last_prompt().ends_with("반생이 챙겨서 2층으로 올라가"));
        let st = state.lock().unwrap();
        match &st.request {
            RequestState::Succeeded(GenerationResult::SafetyOrder(r)) => {
                assert_eq!(r.title, "자재 운반 지시");
                assert_eq!(r.translations.len(), 1);
                assert_eq!(r.translations[0].lang, "vi-VN");
            }
            other => panic!("expected safety result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dream_mode_parses_fenced_output() {
        let client = Arc::new(MockClient::ok(DREAM_JSON));
        let (orc, _) = make_orchestrator(client, Some("k"));
        orc.set_mode(GenerationMode::DreamInterpretation);

        orc.submit("꿈에 황금 돼지가 나왔어").await;

        match orc.request_state() {
            RequestState::Succeeded(GenerationResult::DreamInterpretation(r)) => {
                assert_eq!(r.display_title(), "운명의 계시");
                assert_eq!(r.lucky_numbers, vec![7, 12, 45]);
            }
            other => panic!("expected dream result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_output_fails_with_mode_prefix() {
        let client = Arc::new(MockClient::ok("not json at all"));
        let (orc, _) = make_orchestrator(client, Some("k"));
        orc.set_mode(GenerationMode::DreamInterpretation);

        orc.submit("꿈").await;

        let detail = orc.request_state().error().cloned().expect("failed state");
        assert!(detail.message.starts_with("해몽 실패: "));
        assert!(!detail.credential_required);
        assert!(orc.credentials().has_key(), "parse failure keeps the key");
    }

    #[tokio::test]
    async fn rejected_key_is_invalidated_and_reentry_requested() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("api-key");
        std::fs::write(&path, "revoked-key").unwrap();

        let client = Arc::new(MockClient::err(CompletionError::InvalidCredentials {
            status: 403,
            message: "API key not valid".into(),
        }));
        let state = new_shared_state(GenerationMode::SafetyOrder);
        let orc = PipelineOrchestrator::new(
            Arc::clone(&state),
            client,
            CredentialVault::open(Box::new(FileCredentialStore::new(&path))),
        );

        orc.submit("작업 시작").await;

        let detail = orc.request_state().error().cloned().expect("failed state");
        assert!(detail.credential_required);
        assert_eq!(detail.message, "통역 실패: API Error 403: API key not valid");
        assert!(!orc.credentials().has_key());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn server_error_keeps_key() {
        let client = Arc::new(MockClient::err(CompletionError::Api {
            status: 500,
            message: "Internal error".into(),
        }));
        let (orc, _) = make_orchestrator(client, Some("k"));

        orc.submit("작업 시작").await;

        let detail = orc.request_state().error().cloned().expect("failed state");
        assert!(!detail.credential_required);
        assert_eq!(detail.message, "통역 실패: API Error 500: Internal error");
        assert!(orc.credentials().has_key());
    }

    #[tokio::test]
    async fn missing_key_requires_credential_without_calling_client() {
        let client = Arc::new(MockClient::ok(SAFETY_JSON));
        let (orc, _) = make_orchestrator(client.clone(), None);

        assert_eq!(orc.submit("작업 시작").await, SubmitOutcome::Applied);
        assert!(orc.request_state().error().unwrap().credential_required);
        assert_eq!(client.calls(), 0);

        orc.set_credential("new-key").unwrap();
        orc.submit("작업 시작").await;
        assert!(orc.request_state().result().is_some());
    }

    #[tokio::test]
    async fn submission_while_loading_is_rejected() {
        let client = Arc::new(MockClient::gated(SAFETY_JSON));
        let (orc, _) = make_orchestrator(client.clone(), Some("k"));

        let (first, second) = tokio::join!(orc.submit("첫 번째"), async {
            yield_until(|| orc.request_state().is_busy()).await;
            let second = orc.submit("두 번째").await;
            client.release();
            second
        });

        assert_eq!(first, SubmitOutcome::Applied);
        assert_eq!(second, SubmitOutcome::Rejected);
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn stale_result_does_not_overwrite_reset() {
        let client = Arc::new(MockClient::gated(SAFETY_JSON));
        let synth = Arc::new(MockSynthesizer::new(vec![Voice::new("vi", "vi")]));
        let (orc, _) = make_orchestrator(client.clone(), Some("k"));
        let orc = orc.with_speech_output(SpeechOutput::new(
            Some(synth.clone() as Arc<dyn SpeechSynthesizer>),
            VoiceSettings::default(),
        ));

        let (outcome, ()) = tokio::join!(orc.submit("작업 시작"), async {
            yield_until(|| orc.request_state().is_busy()).await;
            orc.reset();
            client.release();
        });

        assert_eq!(outcome, SubmitOutcome::Discarded);
        assert_eq!(orc.request_state(), RequestState::Idle);
        assert_eq!(synth.cancel_count(), 1, "reset cancels speech output");
    }

    #[tokio::test]
    async fn switching_mode_drops_result_of_the_other_mode() {
        let (orc, _) = make_orchestrator(Arc::new(MockClient::ok(SAFETY_JSON)), Some("k"));
        orc.submit("작업 시작").await;
        assert!(orc.request_state().result().is_some());

        orc.set_mode(GenerationMode::SafetyOrder);
        assert!(orc.request_state().result().is_some(), "same mode keeps the result");

        orc.set_mode(GenerationMode::DreamInterpretation);
        assert_eq!(orc.request_state(), RequestState::Idle);
    }

    #[test]
    fn capabilities_follow_injected_engines() {
        let (orc, _) = make_orchestrator(Arc::new(MockClient::ok("")), None);
        assert!(!orc.can_listen());
        assert!(!orc.can_speak());

        let orc = orc
            .with_speech_input(SpeechInput::new(
                Some(Arc::new(MockRecognizer::held()) as Arc<dyn SpeechRecognizer>),
                "ko-KR",
            ))
            .with_speech_output(SpeechOutput::new(
                Some(Arc::new(MockSynthesizer::new(vec![])) as Arc<dyn SpeechSynthesizer>),
                VoiceSettings::default(),
            ));
        assert!(orc.can_listen());
        assert!(orc.can_speak());
    }

    #[tokio::test]
    async fn reset_stops_speech_still_waiting_for_voices() {
        let synth = Arc::new(MockSynthesizer::holding(vec![]));
        let (orc, _) = make_orchestrator(Arc::new(MockClient::ok(SAFETY_JSON)), Some("k"));
        let orc = orc.with_speech_output(SpeechOutput::new(
            Some(synth.clone() as Arc<dyn SpeechSynthesizer>),
            VoiceSettings {
                voice_wait: std::time::Duration::from_millis(100),
                ..VoiceSettings::default()
            },
        ));

        let (outcome, ()) = tokio::join!(orc.speak("Mang dây buộc lên tầng 2.", "vi-VN"), async {
            tokio::task::yield_now().await;
            orc.reset();
        });

        assert_eq!(outcome, Some(SpeechOutcome::Interrupted));
        assert!(synth.spoken().is_empty(), "nothing reaches the engine after reset");
        assert_eq!(orc.request_state(), RequestState::Idle);
        assert!(orc.speech_warning().is_none());
    }

    #[tokio::test]
    async fn dictation_auto_submits_trimmed_transcript() {
        let client = Arc::new(MockClient::ok(SAFETY_JSON));
        let recognizer = Arc::new(MockRecognizer::scripted(RecognitionEvent::Final(
            "  아시바 해체해  ".into(),
        )));
        let (orc, _) = make_orchestrator(client.clone(), Some("k"));
        let orc = orc.with_speech_input(SpeechInput::new(
            Some(recognizer as Arc<dyn SpeechRecognizer>),
            "ko-KR",
        ));

        assert_eq!(orc.dictate().await, Some(SubmitOutcome::Applied));
        assert_eq!(orc.transcript(), "아시바 해체해");
        assert!(client.last_prompt().ends_with("아시바 해체해"));
        assert!(orc.request_state().result().is_some());
    }

    #[tokio::test]
    async fn speech_failures_only_set_warning() {
        let client = Arc::new(MockClient::ok(SAFETY_JSON));
        let (orc, _) = make_orchestrator(client.clone(), Some("k"));

        assert_eq!(orc.dictate().await, None);
        assert_eq!(
            orc.speech_warning().as_deref(),
            Some("이 환경은 음성 인식을 지원하지 않습니다.")
        );
        assert_eq!(orc.request_state(), RequestState::Idle);
        assert_eq!(client.calls(), 0);

        orc.submit("작업 시작").await;
        assert_eq!(orc.speak_translation(0).await, None);
        assert_eq!(
            orc.speech_warning().as_deref(),
            Some("이 환경은 음성 출력을 지원하지 않습니다.")
        );
        assert!(orc.request_state().result().is_some(), "request state untouched");
    }

    #[tokio::test]
    async fn speak_translation_uses_entry_language() {
        let client = Arc::new(MockClient::ok(SAFETY_JSON));
        let synth = Arc::new(MockSynthesizer::new(vec![Voice::new("Vietnamese", "vi")]));
        let (orc, _) = make_orchestrator(client, Some("k"));
        let orc = orc.with_speech_output(SpeechOutput::new(
            Some(synth.clone() as Arc<dyn SpeechSynthesizer>),
            VoiceSettings::default(),
        ));

        assert_eq!(orc.speak_translation(0).await, None, "no result yet");

        orc.submit("작업 시작").await;
        assert_eq!(orc.speak_translation(0).await, Some(SpeechOutcome::Completed));
        assert_eq!(orc.speak_translation(5).await, None);

        let spoken = synth.spoken();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0].lang, "vi-VN");
        assert_eq!(spoken[0].voice.as_ref().unwrap().name, "Vietnamese");
    }

    #[test]
    fn redirect_affordance_comes_from_environment() {
        let (orc, _) = make_orchestrator(Arc::new(MockClient::ok("")), None);
        assert_eq!(orc.redirect_affordance("https://x.test/"), RedirectAffordance::None);

        let orc = orc.with_environment(BrowserEnvironment::from_user_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) KAKAOTALK 10.4.6",
        ));
        assert_eq!(
            orc.redirect_affordance("https://x.test/"),
            RedirectAffordance::ManualInstructions
        );
    }
}
