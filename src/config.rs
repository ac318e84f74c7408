use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::emotion::DEFAULT_SERVER;

/// First path segments taken by the fixed API routes.
const RESERVED_STORE_NAMES: &[&str] = &["tracks", "murecom"];

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the config file is optional.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub http_listen_addr: String,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Request body limit for uploads, in MiB.
    pub max_upload_mb: usize,
    /// Emotion prediction service settings.
    pub emotion: EmotionConfig,
    /// Audio file stores served and ingested into.
    pub stores: Vec<StoreConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            http_listen_addr: "127.0.0.1:8080".to_string(),
            db_path: None,
            max_upload_mb: 256,
            emotion: EmotionConfig::default(),
            stores: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Base address of the prediction service.
    pub server: String,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
        }
    }
}

/// One store: a root directory served at `/{name}/audio` and ingested via
/// `POST /{name}/new`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub name: String,
    pub file_dir: PathBuf,
    /// Public address clients reach this server at; prefix of audio URLs.
    pub base_url: String,
    /// Score each new track with the emotion service.
    pub enable_emotion: bool,
    /// Import everything already under `file_dir` when the server starts.
    pub load_from_dir: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            file_dir: PathBuf::new(),
            base_url: "http://127.0.0.1:8080".to_string(),
            enable_emotion: false,
            load_from_dir: false,
        }
    }
}

impl AppConfig {
    /// Load config from `path`, or from `~/.config/musicstore/config.toml`.
    ///
    /// An explicit path must exist and parse. A missing default file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::config_path() {
                Some(p) if p.exists() => p,
                _ => {
                    log::debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The resolved config, for `--dry-run`.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Store names become URL path segments and must be unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for store in &self.stores {
            if store.name.is_empty() {
                bail!("Store name must not be empty");
            }
            if store.name.contains('/') {
                bail!("Store name {:?} must not contain '/'", store.name);
            }
            if RESERVED_STORE_NAMES.contains(&store.name.as_str()) {
                bail!("Store name {:?} clashes with an API route", store.name);
            }
            if !seen.insert(store.name.as_str()) {
                bail!("Duplicate store name {:?}", store.name);
            }
            if store.file_dir.as_os_str().is_empty() {
                bail!("Store {:?} has no file_dir", store.name);
            }
        }
        if self.max_upload_mb == 0 {
            bail!("max_upload_mb must be positive");
        }
        Ok(())
    }

    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.name == name)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        dirs.data_dir().join("musicstore.db")
    } else {
        // Fallback: current directory
        PathBuf::from("musicstore.db")
    }
}
