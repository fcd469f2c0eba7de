use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::router::BasePath;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the application is served from
  pub origin: String,
  /// Deployment scope; `/repo` and `/repo/` are equivalent
  pub base_path: String,
  /// Shell document file name under the base path
  pub shell: String,
  /// Prefix for cache purpose names
  pub cache_prefix: String,
  /// Generation tag of the running version
  pub generation: String,
  /// Assets cached at install, relative to the base path
  pub static_assets: Vec<String>,
  /// Host suffixes that are always fetched fresh and never cached
  pub bypass_hosts: Vec<String>,
  /// Reconnection tags that trigger a queue drain
  pub sync_tags: Vec<String>,
  pub notification: NotificationConfig,
  /// SQLite database path (default: $XDG_DATA_HOME/shellcache/cache.db)
  pub database: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      base_path: "/".to_string(),
      shell: "index.html".to_string(),
      cache_prefix: "shellcache".to_string(),
      generation: "v1".to_string(),
      static_assets: vec![
        "index.html".to_string(),
        String::new(),
        "manifest.json".to_string(),
        "icon.png".to_string(),
      ],
      bypass_hosts: Vec::new(),
      sync_tags: vec!["sync-queues".to_string(), "background-sync".to_string()],
      notification: NotificationConfig::default(),
      database: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  /// Icon asset, relative to the base path
  pub icon: String,
  /// Body used when a push arrives without a payload
  pub default_body: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "App".to_string(),
      icon: "icon.png".to_string(),
      default_body: "New update available".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shellcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shellcache/config.yaml
  ///
  /// Falls back to defaults when no file is found.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shellcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shellcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    self.origin_url()?;
    if self.generation.is_empty() {
      return Err(eyre!("generation must not be empty"));
    }
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  pub fn base(&self) -> BasePath {
    BasePath::new(&self.base_path)
  }

  /// Database path: `SHELLCACHE_DB`, then the config value, then the default.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SHELLCACHE_DB") {
      return Ok(PathBuf::from(path));
    }
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => crate::cache::SqliteStorage::default_path(),
    }
  }
}
