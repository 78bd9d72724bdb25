//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings + credential):
//!   Windows: %APPDATA%\global-foreman\
//!   macOS:   ~/Library/Application Support/global-foreman/
//!   Linux:   ~/.config/global-foreman/
//!
//! Data dir (speech models):
//!   Windows: %LOCALAPPDATA%\global-foreman\
//!   macOS:   ~/Library/Application Support/global-foreman/
//!   Linux:   ~/.local/share/global-foreman/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and the stored API key.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Full path to the persisted credential (one fixed file name).
    pub credential_file: PathBuf,
    /// Directory for downloaded GGML Whisper models.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "global-foreman";

    /// Resolves all paths using the `dirs` crate, falling back to the
    /// current directory when the platform has no standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            credential_file: config_dir.join("api-key"),
            models_dir: data_dir.join("models"),
            config_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_share_the_app_directory() {
        let paths = AppPaths::new();
        assert!(paths.settings_file.starts_with(&paths.config_dir));
        assert!(paths.credential_file.starts_with(&paths.config_dir));
        assert!(paths
            .credential_file
            .file_name()
            .is_some_and(|n| n == "api-key"));
        assert!(paths.models_dir.ends_with("global-foreman/models"));
    }
}
