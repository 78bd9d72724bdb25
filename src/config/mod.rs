//! Configuration module for Global Foreman.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each subsystem,
//! `AppPaths` for cross-platform data directories, TOML persistence via
//! `AppConfig::load` / `AppConfig::save`, and the API key store.

pub mod credential;
pub mod paths;
pub mod settings;

pub use credential::{
    ApiKey, CredentialError, CredentialStore, CredentialVault, FileCredentialStore,
    MemoryCredentialStore,
};
pub use paths::AppPaths;
pub use settings::{ApiConfig, AppConfig, SpeechInputConfig, SpeechOutputConfig};
