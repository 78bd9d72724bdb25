//! Speech side channels: dictation in, read-aloud out.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────┐      ┌──────────────────────────────┐
//! │ SpeechInput (adapter)      │      │ SpeechOutput (adapter)       │
//! │ - one session at a time    │      │ - cancel-before-speak        │
//! │ - trims final transcript   │      │ - voice selection + late     │
//! └─────────────┬──────────────┘      │   voice-list wait            │
//!               │ Arc<dyn …>          └──────────────┬───────────────┘
//!               ▼                                    ▼ Arc<dyn …>
//!   SpeechRecognizer (engine)            SpeechSynthesizer (engine)
//!   └─ WhisperRecognizer                 └─ CommandSynthesizer
//! ```
//!
//! Engines are optional.  An adapter built without one reports
//! [`SpeechError::UnsupportedCapability`] instead of failing hard, and
//! speech errors never abort the primary request.

pub mod espeak;
pub mod input;
pub mod output;
pub mod whisper;

use thiserror::Error;

pub use espeak::CommandSynthesizer;
pub use input::{RecognitionEvent, SpeechInput, SpeechRecognizer};
pub use output::{
    select_voice, SpeechOutcome, SpeechOutput, SpeechSynthesizer, SynthesisEvent, Utterance,
    Voice, VoiceSettings,
};
pub use whisper::WhisperRecognizer;

#[cfg(test)]
pub use input::MockRecognizer;
#[cfg(test)]
pub use output::{MockSynthesizer, SynthCall};

// ---------------------------------------------------------------------------
// SpeechError
// ---------------------------------------------------------------------------

/// Failures of either speech adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeechError {
    /// The host has no engine for this capability.
    #[error("{0} is not available on this platform")]
    UnsupportedCapability(&'static str),

    /// A recognition session is already running.
    #[error("speech recognition is already listening")]
    Busy,

    #[error("speech recognition failed: {0}")]
    Recognition(String),

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

/// Primary language subtag, lower-cased: `vi-VN` → `vi`, `ko_KR` → `ko`.
pub fn primary_subtag(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_subtag_handles_separators() {
        assert_eq!(primary_subtag("vi-VN"), "vi");
        assert_eq!(primary_subtag("ko_KR"), "ko");
        assert_eq!(primary_subtag("EN"), "en");
        assert_eq!(primary_subtag(""), "");
    }
}
