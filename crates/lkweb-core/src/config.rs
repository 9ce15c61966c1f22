//! Application configuration management.
//!
//! Configuration is stored at `~/.config/lkweb/config.json`. Every field is
//! optional; missing values fall back to development defaults. The backend
//! location can also be set with `LK_API_BASE_URL`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::api::client::DEFAULT_API_BASE_URL;
use crate::auth::{FileSlot, KeyringSlot, SessionStore};
use crate::handshake::{OriginPolicy, DEFAULT_CALLBACK_PORT, DEFAULT_POLL_INTERVAL};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "lkweb";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the backend location
pub const API_BASE_URL_ENV: &str = "LK_API_BASE_URL";

/// Where the access token is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    /// Origin login results must come from. Defaults to the callback server's.
    pub app_origin: Option<String>,
    pub callback_port: Option<u16>,
    /// Accept login results from any loopback origin. Development only.
    pub allow_loopback_origins: bool,
    pub poll_interval_ms: Option<u64>,
    pub token_storage: TokenStorage,
    pub custom_nickname: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Backend base URL: environment, then config, then the local default.
    pub fn api_base_url(&self) -> String {
        self.resolve_api_base_url(std::env::var(API_BASE_URL_ENV).ok())
    }

    fn resolve_api_base_url(&self, from_env: Option<String>) -> String {
        from_env
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn callback_port(&self) -> u16 {
        self.callback_port.unwrap_or(DEFAULT_CALLBACK_PORT)
    }

    pub fn app_origin(&self) -> Result<Url> {
        let origin = self
            .app_origin
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.callback_port()));
        Url::parse(&origin).with_context(|| format!("Invalid app origin: {}", origin))
    }

    pub fn origin_policy(&self) -> Result<OriginPolicy> {
        if self.allow_loopback_origins {
            warn!("Accepting login results from any loopback origin");
        }
        Ok(OriginPolicy::strict(&self.app_origin()?).allow_loopback(self.allow_loopback_origins))
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    /// Build the session store for the configured backend.
    pub fn session_store(&self) -> SessionStore {
        match self.token_storage {
            TokenStorage::Keyring => SessionStore::new(Arc::new(KeyringSlot)),
            TokenStorage::Memory => SessionStore::in_memory(),
            TokenStorage::File => match self.cache_dir() {
                Ok(dir) => SessionStore::new(Arc::new(FileSlot::new(dir))),
                Err(e) => {
                    warn!(error = %e, "No cache directory, session will not persist");
                    SessionStore::in_memory()
                }
            },
        }
    }
}
