//! Configuration store.
//!
//! [`ConfigStore`] owns the process-wide [`NotificationConfig`]. Readers
//! take a cloned snapshot per operation; writers run a serialized
//! read-modify-persist cycle through [`ConfigStore::update`].

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::ConfigError;

/// Webhook URL written into fresh config files. Treated as "not configured".
pub const WEBHOOK_PLACEHOLDER: &str = "https://your.webhook.url/here";

pub const DEFAULT_CATALOG_URL: &str = "https://pokeapi.co/api/v2";

/// Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configured image URLs for one species.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpritePair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl SpritePair {
    pub fn get(&self, variant: bool) -> Option<&str> {
        if variant {
            self.variant.as_deref()
        } else {
            self.standard.as_deref()
        }
    }

    pub fn set(&mut self, variant: bool, url: String) {
        if variant {
            self.variant = Some(url);
        } else {
            self.standard = Some(url);
        }
    }
}

/// Notification settings. Missing keys fall back to [`Default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub webhook_enabled: bool,
    pub webhook_url: String,
    pub thumbnails_enabled: bool,
    pub local_enabled: bool,
    /// Labels that make an appearance notable
    pub wanted_labels: Vec<String>,
    /// Species key -> configured image URLs
    pub sprites: BTreeMap<String, SpritePair>,
    pub catalog_base_url: String,
    pub footer_text: String,
    /// Appearance records older than this are swept
    pub stale_after_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_enabled: true,
            webhook_url: WEBHOOK_PLACEHOLDER.to_string(),
            thumbnails_enabled: true,
            local_enabled: true,
            wanted_labels: vec!["legendary".to_string()],
            sprites: BTreeMap::new(),
            catalog_base_url: DEFAULT_CATALOG_URL.to_string(),
            footer_text: "Spawn Herald".to_string(),
            stale_after_secs: 30 * 60,
        }
    }
}

impl NotificationConfig {
    /// The webhook target, or `None` when empty or still the placeholder.
    pub fn webhook_target(&self) -> Option<&str> {
        let url = self.webhook_url.trim();
        if url.is_empty() || url == WEBHOOK_PLACEHOLDER {
            None
        } else {
            Some(url)
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Check that a webhook URL is http(s) with a host.
pub fn validate_webhook_url(url: &str) -> ConfigResult<()> {
    let parsed = reqwest::Url::parse(url.trim())
        .map_err(|_| ConfigError::InvalidWebhookUrl(url.to_string()))?;
    let scheme_ok = matches!(parsed.scheme(), "http" | "https");
    let host_ok = parsed.host_str().map(|h| !h.is_empty()).unwrap_or(false);
    if scheme_ok && host_ok {
        Ok(())
    } else {
        Err(ConfigError::InvalidWebhookUrl(url.to_string()))
    }
}

/// Owner of the notification config, optionally backed by a JSON file.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<NotificationConfig>,
    /// Serializes read-modify-persist so `current` is only write-locked
    /// for the final swap.
    writer: Mutex<()>,
}

impl ConfigStore {
    /// Store that never touches disk.
    pub fn in_memory(config: NotificationConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(config),
            writer: Mutex::new(()),
        }
    }

    /// Load the config at `path`, creating it with defaults if missing.
    ///
    /// A corrupt file is replaced by defaults. Keys missing from the file
    /// are backfilled and the merged result is written back.
    pub fn open(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();

        let config = if path.exists() {
            let content = fs::read_to_string(&path).unwrap_or_default();
            match serde_json::from_str::<NotificationConfig>(&content) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
                    NotificationConfig::default()
                }
            }
        } else {
            info!(path = %path.display(), "creating default config");
            NotificationConfig::default()
        };

        persist(&path, &config)?;

        Ok(Self {
            path: Some(path),
            current: RwLock::new(config),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Consistent copy of the current config.
    pub fn snapshot(&self) -> NotificationConfig {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply `mutate` to a copy of the config, persist it, then publish it.
    ///
    /// Writers are serialized. Readers keep getting the previous snapshot
    /// while the file is written. If persisting fails the published config
    /// is left untouched.
    pub fn update<F>(&self, mutate: F) -> ConfigResult<NotificationConfig>
    where
        F: FnOnce(&mut NotificationConfig),
    {
        let _writer = self.writer.lock().map_err(|_| ConfigError::Poisoned)?;
        let current = self.snapshot();
        let mut next = current.clone();
        mutate(&mut next);

        if next == current {
            return Ok(next);
        }

        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *self.current.write().map_err(|_| ConfigError::Poisoned)? = next.clone();
        debug!("config updated");
        Ok(next)
    }

    pub fn set_webhook_url(&self, url: &str) -> ConfigResult<NotificationConfig> {
        validate_webhook_url(url)?;
        let url = url.trim().to_string();
        self.update(|c| c.webhook_url = url)
    }

    pub fn set_webhook_enabled(&self, enabled: bool) -> ConfigResult<NotificationConfig> {
        self.update(|c| c.webhook_enabled = enabled)
    }

    pub fn set_thumbnails_enabled(&self, enabled: bool) -> ConfigResult<NotificationConfig> {
        self.update(|c| c.thumbnails_enabled = enabled)
    }

    pub fn set_local_enabled(&self, enabled: bool) -> ConfigResult<NotificationConfig> {
        self.update(|c| c.local_enabled = enabled)
    }

    /// Remember a resolved sprite URL for `species_key`.
    pub fn record_sprite(
        &self,
        species_key: &str,
        variant: bool,
        url: &str,
    ) -> ConfigResult<NotificationConfig> {
        let key = species_key.to_string();
        let url = url.to_string();
        self.update(move |c| c.sprites.entry(key).or_default().set(variant, url))
    }
}

/// Atomic write: temp file in the same directory, then rename.
fn persist(path: &Path, config: &NotificationConfig) -> ConfigResult<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let body = serde_json::to_string_pretty(config)?;
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(body.as_bytes())?;
    tmp.persist(path).map_err(|e| ConfigError::Persist {
        path: path.display().to_string(),
        source: e.error,
    })?;
    Ok(())
}
