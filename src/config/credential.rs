//! API key persistence.
//!
//! The key is a single process-wide value.  [`CredentialVault`] holds the
//! in-memory copy and writes every change through to a [`CredentialStore`]
//! before committing it, so the stored and in-memory values never disagree
//! after a successful call.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

// ---------------------------------------------------------------------------
// ApiKey
// ---------------------------------------------------------------------------

/// The generation endpoint credential.  `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First four characters followed by an ellipsis, for status output.
    pub fn masked(&self) -> String {
        let head: String = self.0.chars().take(4).collect();
        format!("{head}…")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

// ---------------------------------------------------------------------------
// CredentialError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("API key must not be empty")]
    Empty,
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

/// Persistent storage for exactly one key.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<ApiKey>, CredentialError>;
    fn save(&self, key: &ApiKey) -> Result<(), CredentialError>;
    fn clear(&self) -> Result<(), CredentialError>;
}

/// Stores the key as the sole content of one file.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<ApiKey>, CredentialError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let value = content.trim();
        Ok((!value.is_empty()).then(|| ApiKey::new(value)))
    }

    fn save(&self, key: &ApiKey) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, key.expose())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Volatile store; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<ApiKey>>,
}

impl MemoryCredentialStore {
    pub fn with_key(key: &str) -> Self {
        Self {
            slot: Mutex::new(Some(ApiKey::new(key))),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ApiKey>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<ApiKey>, CredentialError> {
        Ok(self.slot().clone())
    }

    fn save(&self, key: &ApiKey) -> Result<(), CredentialError> {
        *self.slot() = Some(key.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        *self.slot() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CredentialVault
// ---------------------------------------------------------------------------

/// Process-wide holder of the current key.
pub struct CredentialVault {
    store: Box<dyn CredentialStore>,
    current: Mutex<Option<ApiKey>>,
}

impl CredentialVault {
    /// Read the stored key (if any) once at startup.
    pub fn open(store: Box<dyn CredentialStore>) -> Self {
        let current = store.load().unwrap_or_else(|e| {
            log::warn!("credential: could not read stored key: {e}");
            None
        });
        Self {
            store,
            current: Mutex::new(current),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ApiKey>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> Option<ApiKey> {
        self.slot().clone()
    }

    pub fn has_key(&self) -> bool {
        self.slot().is_some()
    }

    /// Persist `value` and then make it current.  The in-memory value is
    /// left untouched when persisting fails.
    pub fn replace(&self, value: &str) -> Result<(), CredentialError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CredentialError::Empty);
        }
        let key = ApiKey::new(value);
        self.store.save(&key)?;
        *self.slot() = Some(key);
        log::info!("credential: API key updated");
        Ok(())
    }

    /// Use `value` for this process only, without touching the store.
    pub fn set_session_key(&self, value: &str) -> Result<(), CredentialError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CredentialError::Empty);
        }
        *self.slot() = Some(ApiKey::new(value));
        Ok(())
    }

    /// Forget the key in memory and remove it from the store.
    pub fn invalidate(&self) -> Result<(), CredentialError> {
        *self.slot() = None;
        self.store.clear()?;
        log::info!("credential: API key invalidated");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
