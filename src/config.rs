//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Main config: `$XDG_CONFIG_HOME/rtcli/config.toml`
//! 3. Environment variables: `RTCLI_*` prefix
//! 4. `--url` command line override
//! 5. Custom override: `$XDG_CONFIG_HOME/rtcli/custom.toml`, loaded by
//!    [`Settings::load_custom`] once options are known

use std::path::{Path, PathBuf};

use config::{Config, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::connection::{AliasTable, ConnectionResolver};

/// Default daemon endpoint.
pub const DEFAULT_SCGI_URL: &str = "scgi://localhost:5000";

#[derive(Error, Debug)]
#[error("config error: {message}")]
pub struct SettingsError {
    pub message: String,
}

impl SettingsError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Raw settings for intermediate parsing (`None` → not specified).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub scgi_url: Option<String>,
    pub connections: Option<AliasTable>,
}

/// Effective configuration shared by all tools.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Default daemon endpoint (or alias name)
    pub scgi_url: String,
    /// Connection aliases
    pub connections: AliasTable,
    #[serde(skip)]
    config_dir: Option<PathBuf>,
    #[serde(skip)]
    url_pinned: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scgi_url: DEFAULT_SCGI_URL.to_string(),
            connections: AliasTable::new(),
            config_dir: None,
            url_pinned: false,
        }
    }
}

/// Get the XDG config directory for rtcli.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "rtcli").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Main config file inside a config directory.
pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join("config.toml")
}

/// Custom override file inside a config directory.
pub fn custom_config_path(config_dir: &Path) -> PathBuf {
    config_dir.join("custom.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> SettingsResult<RawSettings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SettingsError::new(format!("read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| SettingsError::new(format!("parse {}: {}", path.display(), e)))
}

impl Settings {
    /// Load settings with layered precedence.
    ///
    /// `config_dir` defaults to the XDG config directory. Missing files are
    /// skipped; unreadable or malformed ones are errors.
    pub fn load(config_dir: Option<&Path>) -> SettingsResult<Self> {
        let mut current = Self {
            config_dir: config_dir.map(Path::to_path_buf).or_else(global_config_dir),
            ..Self::default()
        };

        if let Some(dir) = current.config_dir.clone() {
            let path = config_path(&dir);
            if path.exists() {
                debug!("load: {}", path.display());
                let raw = load_raw_settings(&path)?;
                current.apply(raw, false);
            }
        }

        current.apply_env_overrides()?;
        current.expand_paths();
        Ok(current)
    }

    /// Replace the configured endpoint for this invocation (`--url`).
    ///
    /// A pinned endpoint survives [`load_custom`](Self::load_custom).
    pub fn override_url(&mut self, url: &str) {
        debug!("override_url: {}", url);
        self.scgi_url = url.to_string();
        self.url_pinned = true;
        self.expand_paths();
    }

    /// Load the user's custom override file, if there is one.
    ///
    /// Aliases merge into the table (custom entries win). Returns whether a
    /// file was loaded.
    pub fn load_custom(&mut self) -> SettingsResult<bool> {
        let Some(dir) = self.config_dir.clone() else {
            return Ok(false);
        };
        let path = custom_config_path(&dir);
        if !path.exists() {
            return Ok(false);
        }
        debug!("load_custom: {}", path.display());
        let raw = load_raw_settings(&path)?;
        self.apply(raw, true);
        self.expand_paths();
        Ok(true)
    }

    /// Resolver over this configuration's alias table.
    pub fn resolver(&self) -> ConnectionResolver<'_> {
        ConnectionResolver::new(&self.connections)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> SettingsResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SettingsError::new(format!("serialize config: {e}")))
    }

    /// Apply a raw layer. `merge` unions the alias tables instead of
    /// replacing them.
    fn apply(&mut self, raw: RawSettings, merge: bool) {
        if let Some(url) = raw.scgi_url {
            if !self.url_pinned {
                self.scgi_url = url;
            }
        }
        if let Some(connections) = raw.connections {
            if merge {
                self.connections.extend(connections);
            } else {
                self.connections = connections;
            }
        }
    }

    /// Apply RTCLI_* environment variables as explicit overrides.
    fn apply_env_overrides(&mut self) -> SettingsResult<()> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("RTCLI")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| SettingsError::new(e.to_string()))?;

        if let Ok(val) = config.get_string("scgi_url") {
            self.scgi_url = val;
        }
        Ok(())
    }

    /// Expand `~`, `$VAR` and `${VAR}` in the endpoint.
    fn expand_paths(&mut self) {
        if let Ok(expanded) = shellexpand::full(&self.scgi_url) {
            self.scgi_url = expanded.into_owned();
        }
    }
}
