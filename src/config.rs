use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin relative manifest entries are resolved against at install time
  pub origin: Option<Url>,
  /// Resources stored in the static partition at install time
  #[serde(default = "default_manifest")]
  pub manifest: Vec<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub rules: RulesConfig,
  #[serde(default)]
  pub network: NetworkConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: None,
      manifest: default_manifest(),
      cache: CacheConfig::default(),
      rules: RulesConfig::default(),
      network: NetworkConfig::default(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
  /// Name of the long-lived partition filled at install time
  #[serde(default = "default_static_name")]
  pub static_name: String,
  /// Name of the partition filled as requests come in
  #[serde(default = "default_dynamic_name")]
  pub dynamic_name: String,
  /// SQLite database location (default: $XDG_DATA_HOME/swcache/cache.db)
  pub db_path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      static_name: default_static_name(),
      dynamic_name: default_dynamic_name(),
      db_path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
  /// Path suffixes that mark a static asset (case-sensitive)
  #[serde(default = "default_static_extensions")]
  pub static_extensions: Vec<String>,
  /// Regular expressions matched against the full URL of data requests
  #[serde(default = "default_api_patterns")]
  pub api_patterns: Vec<String>,
}

impl Default for RulesConfig {
  fn default() -> Self {
    Self {
      static_extensions: default_static_extensions(),
      api_patterns: default_api_patterns(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  /// Transport timeout for a single fetch, in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      user_agent: default_user_agent(),
    }
  }
}

impl NetworkConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

fn default_manifest() -> Vec<String> {
  vec!["/".to_string(), "/index.html".to_string()]
}

fn default_static_name() -> String {
  "static".to_string()
}

fn default_dynamic_name() -> String {
  "dynamic".to_string()
}

fn default_static_extensions() -> Vec<String> {
  [
    ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".ico", ".woff", ".woff2",
  ]
  .into_iter()
  .map(String::from)
  .collect()
}

fn default_api_patterns() -> Vec<String> {
  vec!["/api/".to_string(), "/images/".to_string()]
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_user_agent() -> String {
  format!("swcache/{}", env!("CARGO_PKG_VERSION"))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
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
      None => {
        tracing::debug!("no configuration file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.cache.static_name == config.cache.dynamic_name {
      return Err(eyre!(
        "cache.static_name and cache.dynamic_name must differ (both are {:?})",
        config.cache.static_name
      ));
    }
    Ok(config)
  }

  /// Database path: `SWCACHE_DB_PATH` first, then the config file, then the
  /// data directory.
  pub fn db_path(&self) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SWCACHE_DB_PATH") {
      return Ok(PathBuf::from(path));
    }
    if let Some(path) = &self.cache.db_path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("swcache").join("cache.db"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_yaml_uses_defaults() {
    let config = Config::from_yaml("{}").unwrap();
    assert_eq!(config.manifest, vec!["/", "/index.html"]);
    assert_eq!(config.cache, CacheConfig::default());
    assert_eq!(config.rules.static_extensions.len(), 9);
    assert_eq!(config.rules.api_patterns, vec!["/api/", "/images/"]);
    assert_eq!(config.network.timeout(), Duration::from_secs(30));
  }

  #[test]
  fn test_full_yaml() {
    let yaml = r#"
origin: https://games.example.com
manifest:
  - /
  - /manifest.json
  - https://cdn.example.com/app.js
cache:
  static_name: nexus-static-v1
  dynamic_name: nexus-dynamic-v1
network:
  timeout_secs: 5
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.cache.static_name, "nexus-static-v1");
    assert_eq!(config.network.timeout_secs, 5);
    assert_eq!(
      config.origin.map(String::from).as_deref(),
      Some("https://games.example.com/")
    );
    assert_eq!(
      config.manifest,
      vec!["/", "/manifest.json", "https://cdn.example.com/app.js"]
    );
  }

  #[test]
  fn test_builtin_defaults_match_empty_file() {
    let builtin = Config::default();
    let empty = Config::from_yaml("{}").unwrap();
    assert!(builtin.origin.is_none());
    assert_eq!(builtin.manifest, empty.manifest);
    assert_eq!(builtin.cache, empty.cache);
  }

  #[test]
  fn test_partition_names_must_differ() {
    let yaml = "cache: {static_name: same, dynamic_name: same}";
    assert!(Config::from_yaml(yaml).is_err());
  }
}
