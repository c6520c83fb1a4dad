use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub route: RouteConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the backend, without the `/api` prefix (e.g. "https://ops.example.com")
  pub base_url: String,
  /// Liveness endpoint probed to detect connectivity, relative to `{base_url}/api`
  #[serde(default = "default_health_endpoint")]
  pub health_endpoint: String,
  /// Seconds between liveness probes
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
  /// Default per-request timeout in milliseconds
  #[serde(default = "default_request_timeout_ms")]
  pub request_timeout_ms: u64,
  /// Queued requests processed per batch when draining the offline queue
  #[serde(default = "default_drain_batch_size")]
  pub drain_batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// How long a cached collection is served without a refetch
  #[serde(default = "default_freshness_ms")]
  pub freshness_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  #[serde(default = "default_base_delay_ms")]
  pub base_delay_ms: u64,
  #[serde(default = "default_max_delay_ms")]
  pub max_delay_ms: u64,
  #[serde(default = "default_backoff_multiplier")]
  pub backoff_multiplier: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
  /// Identical consecutive routes within this window are not re-delivered
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
  /// Navigation lock auto-release delay
  #[serde(default = "default_lock_release_ms")]
  pub lock_release_ms: u64,
  /// Distinct navigation attempts tolerated while the lock is held
  #[serde(default = "default_max_locked_attempts")]
  pub max_locked_attempts: u32,
  /// Deferred notification retries before the notification is forced through
  #[serde(default = "default_max_notify_deferrals")]
  pub max_notify_deferrals: u32,
}

fn default_health_endpoint() -> String {
  "/health".to_string()
}

fn default_probe_interval_secs() -> u64 {
  30
}

fn default_request_timeout_ms() -> u64 {
  30_000
}

fn default_drain_batch_size() -> usize {
  5
}

fn default_freshness_ms() -> u64 {
  5_000
}

fn default_max_retries() -> u32 {
  3
}

fn default_base_delay_ms() -> u64 {
  1_000
}

fn default_max_delay_ms() -> u64 {
  10_000
}

fn default_backoff_multiplier() -> u32 {
  2
}

fn default_debounce_ms() -> u64 {
  100
}

fn default_lock_release_ms() -> u64 {
  300
}

fn default_max_locked_attempts() -> u32 {
  5
}

fn default_max_notify_deferrals() -> u32 {
  3
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      freshness_ms: default_freshness_ms(),
    }
  }
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: default_max_retries(),
      base_delay_ms: default_base_delay_ms(),
      max_delay_ms: default_max_delay_ms(),
      backoff_multiplier: default_backoff_multiplier(),
    }
  }
}

impl Default for RouteConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
      lock_release_ms: default_lock_release_ms(),
      max_locked_attempts: default_max_locked_attempts(),
      max_notify_deferrals: default_max_notify_deferrals(),
    }
  }
}

impl Config {
  /// Build a config for the given backend URL with every tunable at its default.
  pub fn for_base_url(base_url: impl Into<String>) -> Self {
    Self {
      api: ApiConfig {
        base_url: base_url.into(),
        health_endpoint: default_health_endpoint(),
        probe_interval_secs: default_probe_interval_secs(),
        request_timeout_ms: default_request_timeout_ms(),
        drain_batch_size: default_drain_batch_size(),
      },
      cache: CacheConfig::default(),
      retry: RetryConfig::default(),
      route: RouteConfig::default(),
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./bizsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/bizsync/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/bizsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("bizsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("bizsync").join("config.yaml");
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

  pub fn freshness_window(&self) -> Duration {
    Duration::from_millis(self.cache.freshness_ms)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_millis(self.api.request_timeout_ms)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.api.probe_interval_secs)
  }
}
