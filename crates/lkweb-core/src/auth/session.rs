//! Persisted slot holding the current access token.
//!
//! The store never fails: storage errors are logged and treated as "no
//! token", so an unavailable backend degrades to always-unauthenticated.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain service and account used by `KeyringSlot`
const KEYRING_SERVICE: &str = "lkweb";
const KEYRING_ACCOUNT: &str = "access_token";

/// Backing storage for the token.
pub trait TokenSlot: Send + Sync {
    fn read(&self) -> Result<Option<String>>;
    fn write(&self, token: &str) -> Result<()>;
    fn remove(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// Stores the token as JSON in the cache directory.
pub struct FileSlot {
    cache_dir: PathBuf,
}

impl FileSlot {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl TokenSlot for FileSlot {
    fn read(&self) -> Result<Option<String>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(data.token))
    }

    fn write(&self, token: &str) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = SessionData {
            token: token.to_string(),
            created_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&data)?;
        std::fs::write(path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Stores the token in the OS keychain.
pub struct KeyringSlot;

impl KeyringSlot {
    fn entry() -> Result<Entry> {
        Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT).context("Failed to create keyring entry")
    }
}

impl TokenSlot for KeyringSlot {
    fn read(&self) -> Result<Option<String>> {
        match Self::entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn write(&self, token: &str) -> Result<()> {
        Self::entry()?
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    fn remove(&self) -> Result<()> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

/// Process-local slot. Nothing survives a restart.
#[derive(Default)]
pub struct MemorySlot {
    token: Mutex<Option<String>>,
}

impl TokenSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>> {
        Ok(self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("memory slot poisoned"))?
            .clone())
    }

    fn write(&self, token: &str) -> Result<()> {
        *self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("memory slot poisoned"))? = Some(token.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("memory slot poisoned"))? = None;
        Ok(())
    }
}

/// The process-wide credential slot. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    slot: Arc<dyn TokenSlot>,
}

impl SessionStore {
    pub fn new(slot: Arc<dyn TokenSlot>) -> Self {
        Self { slot }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySlot::default()))
    }

    /// Current token, if any
    pub fn get(&self) -> Option<String> {
        match self.slot.read() {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Token storage unavailable, treating as logged out");
                None
            }
        }
    }

    pub fn set(&self, token: &str) {
        debug!("Storing access token");
        if let Err(e) = self.slot.write(token) {
            warn!(error = %e, "Failed to persist access token");
        }
    }

    pub fn clear(&self) {
        debug!("Clearing access token");
        if let Err(e) = self.slot.remove() {
            warn!(error = %e, "Failed to clear access token");
        }
    }

    pub fn has_token(&self) -> bool {
        self.get().is_some()
    }
}
