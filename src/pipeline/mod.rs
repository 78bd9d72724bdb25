//! Request orchestration.
//!
//! Wires prompt building, the completion call and normalization into one
//! request lifecycle and exposes the shared state the front-end reads.
//!
//! # Architecture
//!
//! ```text
//! front-end (app.rs)
//!        │ submit / dictate / speak / reset
//!        ▼
//! PipelineOrchestrator
//!        ├─ CredentialVault ──▶ ApiKey
//!        ├─ PromptBuilder   ──▶ prompt
//!        ├─ CompletionClient (await) ──▶ raw text
//!        ├─ normalize       ──▶ GenerationResult
//!        └─ SpeechInput / SpeechOutput (side channels)
//!
//! SharedState (Arc<Mutex<SessionState>>) ←── read by the front-end
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{speech_warning_text, PipelineError, PipelineOrchestrator, SubmitOutcome};
pub use state::{new_shared_state, ErrorDetail, RequestState, SessionState, SharedState};
