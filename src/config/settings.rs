//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files.  Every section is
//! `#[serde(default)]`, so a partial `settings.toml` is filled in with
//! defaults.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::llm::GenerationMode;

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

/// Settings for the text-generation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Scheme + host of the endpoint, without a trailing path.
    pub base_url: String,
    /// Model name inserted into `/v1beta/models/{model}:generateContent`.
    pub model: String,
    /// Maximum seconds to wait for one completion.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-2.0-flash".into(),
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechInputConfig
// ---------------------------------------------------------------------------

/// Settings for single-utterance speech recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechInputConfig {
    /// Recognition locale.  Only the primary subtag is passed to Whisper.
    pub locale: String,
    /// GGML Whisper model.  `None` means `<models dir>/ggml-small.bin`.
    pub whisper_model: Option<PathBuf>,
    /// Hard cap on one utterance.
    pub max_utterance_secs: f32,
    /// Trailing silence that ends an utterance once speech was heard.
    pub end_silence_secs: f32,
    /// RMS level above which a 30 ms frame counts as speech.
    pub energy_threshold: f32,
}

impl Default for SpeechInputConfig {
    fn default() -> Self {
        Self {
            locale: "ko-KR".into(),
            whisper_model: None,
            max_utterance_secs: 30.0,
            end_silence_secs: 1.2,
            energy_threshold: 0.015,
        }
    }
}

impl SpeechInputConfig {
    /// Resolved Whisper model path.
    pub fn model_path(&self, paths: &AppPaths) -> PathBuf {
        self.whisper_model
            .clone()
            .unwrap_or_else(|| paths.models_dir.join("ggml-small.bin"))
    }
}

// ---------------------------------------------------------------------------
// SpeechOutputConfig
// ---------------------------------------------------------------------------

/// Settings for read-aloud of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechOutputConfig {
    /// Disable to hide the read-aloud feature entirely.
    pub enabled: bool,
    /// Output volume in `0.0 ..= 1.0`.
    pub volume: f32,
    /// Relative speaking rate; `1.0` is the engine's normal speed.
    pub rate: f32,
    /// How long to wait for a late voice list before using the default voice.
    pub voice_wait_ms: u64,
    /// `espeak-ng`-compatible synthesizer executable.
    pub command: String,
}

impl Default for SpeechOutputConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume: 1.0,
            rate: 0.9,
            voice_wait_ms: 1_500,
            command: "espeak-ng".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use global_foreman::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Mode selected at startup.
    pub mode: GenerationMode,
    pub api: ApiConfig,
    pub speech_input: SpeechInputConfig,
    pub speech_output: SpeechOutputConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
