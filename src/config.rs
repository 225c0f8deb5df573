use crate::offline::{default_assets, AssetEntry, CacheError, Manifest};
use crate::{error::Result, NotebookError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OfflineConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Explicit version tag; derived from the asset list when unset
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_assets")]
    pub assets: Vec<AssetEntry>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        OfflineConfig {
            enabled: default_enabled(),
            origin: default_origin(),
            version: Some(default_cache_version()),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            assets: default_assets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default = "default_cache_file")]
    pub cache_file: String,
    #[serde(default = "default_seed_sample")]
    pub seed_sample: bool,
    #[serde(default)]
    pub offline: OfflineConfig,
}

/// Keys an `offline` object must carry to be left untouched on load
const OFFLINE_KEYS: [&str; 4] = ["enabled", "origin", "fetch_timeout_secs", "assets"];

fn default_app_name() -> String {
    "my-notes-pwa".to_string()
}

fn default_database_file() -> String {
    "notebook.db".to_string()
}

fn default_cache_file() -> String {
    "offline-cache.db".to_string()
}

fn default_seed_sample() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_cache_version() -> String {
    "v1".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app_name: default_app_name(),
            data_dir: None,
            database_file: default_database_file(),
            cache_file: default_cache_file(),
            seed_sample: default_seed_sample(),
            offline: OfflineConfig::default(),
        }
    }
}

impl Config {
    /// Directory holding the store and cache files
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => {
                let mut dir = dirs::data_dir().ok_or_else(|| {
                    NotebookError::Config("Failed to get data directory".to_string())
                })?;
                dir.push("notebook");
                Ok(dir)
            }
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(&self.database_file))
    }

    pub fn cache_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(&self.cache_file))
    }

    pub fn manifest(&self) -> std::result::Result<Manifest, CacheError> {
        Manifest::new(
            &self.app_name,
            &self.offline.origin,
            self.offline.version.as_deref(),
            self.offline.assets.clone(),
        )
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir()
        .ok_or_else(|| NotebookError::Config("Failed to get config directory".to_string()))?;

    path.push("notebook");
    fs::create_dir_all(&path)?;

    path.push("config.json");
    Ok(path)
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path()?)
}

/// Reads the config at `path`, writing defaults when it is missing
///
/// Files from older versions are rewritten with the fields they lack.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        let default_config = Config::default();
        save_config_to(path, &default_config)?;
        return Ok(default_config);
    }

    let content = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| NotebookError::Config(format!("Failed to parse config: {}", e)))?;
    let mut config: Config = serde_json::from_value(value.clone())
        .map_err(|e| NotebookError::Config(format!("Failed to parse config: {}", e)))?;

    let mut changed = false;
    if config.offline.fetch_timeout_secs == 0 {
        config.offline.fetch_timeout_secs = default_fetch_timeout_secs();
        changed = true;
    }

    let needs_backfill = value
        .as_object()
        .map(|obj| {
            let offline_complete = obj
                .get("offline")
                .and_then(|offline| offline.as_object())
                .map(|offline| {
                    OFFLINE_KEYS.iter().all(|key| offline.contains_key(*key))
                })
                .unwrap_or(false);
            !offline_complete || !obj.contains_key("seed_sample")
        })
        .unwrap_or(false);
    if needs_backfill || changed {
        save_config_to(path, &config)?;
    }

    Ok(config)
}

pub fn save_config(config: &Config) -> Result<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| NotebookError::Config(format!("Failed to serialize config: {}", e)))?;

    fs::write(path, content)?;

    Ok(())
}
