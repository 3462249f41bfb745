//! Settings for the umlsync command line.
//!
//! Read from `config.toml` under the user's config directory. The
//! `UMLSYNC_SERVER` environment variable overrides the file's server, and
//! command-line flags override both.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming the Model Store base URL
pub const SERVER_ENV: &str = "UMLSYNC_SERVER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model Store base URL
    pub server_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// File name used by `export` when no output is given
    pub default_export_name: String,
    /// File name used by `export --generate` when no output is given
    pub default_generated_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:5000".to_string(),
            timeout_secs: 10,
            default_export_name: "uml_diagram.xml".to_string(),
            default_generated_name: "generated_classes.zip".to_string(),
        }
    }
}

impl Config {
    /// `<config dir>/umlsync/config.toml`
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("umlsync").join("config.toml"))
    }

    /// Load the user's config file (defaults when there is none), then
    /// apply the environment.
    pub fn load() -> Result<Self> {
        let config = match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        Ok(config.with_server_override(std::env::var(SERVER_ENV).ok()))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Invalid config {:?}", path))
    }

    /// Replace the server URL when `server` is set and non-empty
    pub fn with_server_override(mut self, server: Option<String>) -> Self {
        if let Some(server) = server.filter(|s| !s.trim().is_empty()) {
            self.server_url = server;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}
