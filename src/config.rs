//! Configuration for the projection helper
//!
//! Loads configuration from TOML file at `~/.config/area/projector.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::transfer::{BackendPreference, TransferSettings};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// X display to connect to, `$DISPLAY` when unset
    pub display: Option<String>,
    /// Transfer backend: "auto", "render" or "image"
    pub backend: BackendPreference,
    /// Client-side buffer bound per image batch, in bytes
    pub row_batch_bytes: usize,
    /// Tracing filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display: None,
            backend: BackendPreference::Auto,
            row_batch_bytes: TransferSettings::default().row_batch_bytes,
            log_filter: "area_projector=info,warn".to_string(),
        }
    }
}

/// Where a configuration came from, reported once logging is up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file existed; defaults were written to this path
    Created(PathBuf),
    /// No file existed and writing the defaults failed
    Defaults { path: PathBuf, error: String },
}

impl ConfigSource {
    pub fn log(&self, config: &Config) {
        match self {
            Self::File(path) => info!("Configuration loaded from {:?}", path),
            Self::Created(path) => info!("Created default config file at {:?}", path),
            Self::Defaults { path, error } => {
                warn!("Failed to create default config file at {:?}: {}", path, error)
            }
        }
        debug!("Config: {:?}", config);
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<(Self, ConfigSource)> {
        Self::load_or_create(&Self::config_path()?)
    }

    fn load_or_create(config_path: &Path) -> Result<(Self, ConfigSource)> {
        if config_path.exists() {
            return Self::load_from(config_path);
        }

        let source = match Self::save_default(config_path) {
            Ok(()) => ConfigSource::Created(config_path.to_path_buf()),
            Err(e) => ConfigSource::Defaults {
                path: config_path.to_path_buf(),
                error: format!("{:#}", e),
            },
        };
        Ok((Self::default(), source))
    }

    /// Load configuration from an explicit path, which must exist
    pub fn load_from(path: &Path) -> Result<(Self, ConfigSource)> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        Ok((Self::parse(&content)?, ConfigSource::File(path.to_path_buf())))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            row_batch_bytes: self.row_batch_bytes,
        }
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("area");

        Ok(config_dir.join("projector.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;
        Ok(())
    }
}
