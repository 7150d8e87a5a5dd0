use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{Error, Result};

/// Directory inside the vault root that holds the index database and the
/// per-vault config file. Everything under it is invisible to the indexer.
pub const VAULT_DATA_DIR: &str = ".notegraph";
pub const VAULT_CONFIG_FILE: &str = "config.json";
pub const VAULT_DB_FILE: &str = "index.db";

/// Application-level settings, loaded from an optional config file with a
/// `NOTEGRAPH_*` environment overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub logging: LoggingConfig,
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Quiet window before a pending file job is dispatched, in milliseconds.
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub semantic_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            indexing: IndexingConfig { debounce_ms: 300 },
            search: SearchConfig {
                semantic_enabled: false,
            },
        }
    }
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("logging.level", "info")
            .map_err(|e| Error::Config(e.to_string()))?
            .set_default("indexing.debounce_ms", 300i64)
            .map_err(|e| Error::Config(e.to_string()))?
            .set_default("search.semantic_enabled", false)
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        builder
            .add_source(config::Environment::with_prefix("NOTEGRAPH").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))
    }
}

/// Per-vault settings that are not rebuildable from the Markdown corpus.
/// Stored as JSON at `<vault>/.notegraph/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub daily_note_pattern: Option<String>,
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
    #[serde(default)]
    pub semantic_search: bool,
    #[serde(default)]
    pub preferences: HashMap<String, serde_json::Value>,
}

impl VaultConfig {
    pub fn path_for(vault_root: &Path) -> PathBuf {
        vault_root.join(VAULT_DATA_DIR).join(VAULT_CONFIG_FILE)
    }

    /// Missing config is a fresh vault, not an error.
    pub fn load(vault_root: &Path) -> Result<Self> {
        let path = Self::path_for(vault_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        serde_json::from_str(&raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn save(&self, vault_root: &Path) -> Result<()> {
        let path = Self::path_for(vault_root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(&path, raw).map_err(|e| Error::io(&path, e))
    }
}

pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer());

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(())
}
