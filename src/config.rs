use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::{PlaceholderPolicy, RenderMode};

pub const SESSION_COOKIE_ENV: &str = "TRIBUTE_SYNC_SESSION_COOKIE";

const MISSING_CONFIG: &str = "No configuration file found. \
  Create one at ~/.config/tribute-sync/config.yaml\n\
  See config.example.yaml for the format.";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  /// Which transport a session is built with
  #[serde(default)]
  pub render_mode: RenderMode,
  #[serde(default)]
  pub server_render: ServerRenderConfig,
  #[serde(default)]
  pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Origin every per-kind base path is joined onto
  pub url: String,
  pub user_agent: Option<String>,
  /// Query parameters appended to every GET (e.g. a nonce)
  #[serde(default)]
  pub default_query: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerRenderConfig {
  /// What server-rendered reads answer with: synthesize or empty
  #[serde(default)]
  pub placeholders: PlaceholderPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
  /// Delay before success/error falls back to idle
  #[serde(default = "default_reset_delay_ms")]
  pub reset_delay_ms: u64,
}

impl Default for WorkflowConfig {
  fn default() -> Self {
    Self {
      reset_delay_ms: default_reset_delay_ms(),
    }
  }
}

impl WorkflowConfig {
  pub fn reset_delay(&self) -> Duration {
    Duration::from_millis(self.reset_delay_ms)
  }
}

fn default_reset_delay_ms() -> u64 {
  3000
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tribute-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tribute-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(MISSING_CONFIG)),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("tribute-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tribute-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  pub fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  /// Parse configuration from an in-memory YAML document.
  pub fn from_yaml_str(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))
  }

  /// Session cookie (`name=value`) from TRIBUTE_SYNC_SESSION_COOKIE, if set.
  pub fn session_cookie() -> Option<String> {
    std::env::var(SESSION_COOKIE_ENV)
      .ok()
      .filter(|c| !c.trim().is_empty())
  }
}
