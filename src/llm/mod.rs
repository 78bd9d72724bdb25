//! Generation pipeline pieces: prompt → completion → normalized result.
//!
//! * [`PromptBuilder`] renders the mode's instruction, the JSON-only
//!   constraint and the user text into one prompt.
//! * [`CompletionClient`] is the async seam for the hosted model;
//!   [`GeminiClient`] is the production implementation.
//! * [`normalize`] turns raw model output into a [`GenerationResult`],
//!   repairing fences and tolerating missing or mistyped fields.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use global_foreman::config::{ApiConfig, ApiKey};
//! use global_foreman::llm::{normalize, CompletionClient, GeminiClient, GenerationMode, PromptBuilder};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = GeminiClient::from_config(&ApiConfig::default());
//!     let mode = GenerationMode::SafetyOrder;
//!     let prompt = PromptBuilder::new().build(mode, "반생이 챙겨서 2층으로 올라가");
//!
//!     let raw = client.complete(&prompt, &ApiKey::new("…")).await.unwrap();
//!     let result = normalize(&raw, mode).unwrap();
//!     println!("{}", result.title());
//! }
//! ```

pub mod client;
pub mod normalize;
pub mod prompt;
pub mod types;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{CompletionClient, CompletionError, GeminiClient};
pub use normalize::{field_policy, normalize, strip_code_fences, FieldPolicy, FieldRule, NormalizeError};
pub use prompt::PromptBuilder;
pub use types::{
    DreamResult, GenerationMode, GenerationRequest, GenerationResult, SafetyOrderResult,
    TranslationEntry, DEFAULT_DREAM_TITLE,
};

