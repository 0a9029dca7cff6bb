//! Configuration management for sync policy, cache location, and remote access.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub cache_path: Option<PathBuf>,

   pub freshness_window_secs:  u64,
   pub shrinkage_threshold:    f64,
   pub full_sync_max_age_days: u32,
   pub discovery_max_age_days: u32,
   pub due_date_lookback_days: u32,
   pub missing_due_date_ratio: f64,

   pub remote_base_url:   Option<String>,
   pub remote_token:      Option<String>,
   pub remote_timeout_ms: u64,
   pub sync_timeout_ms:   u64,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         cache_path:             None,
         freshness_window_secs:  60 * 60,
         shrinkage_threshold:    0.8,
         full_sync_max_age_days: 7,
         discovery_max_age_days: 3,
         due_date_lookback_days: 365,
         missing_due_date_ratio: 0.5,
         remote_base_url:        None,
         remote_token:           None,
         remote_timeout_ms:      30_000,
         sync_timeout_ms:        300_000,
      }
   }
}

impl Config {
   pub fn load() -> Self {
      let config_path = ensure_global_config();

      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(config_path))
         .merge(Env::prefixed("DOCKETSYNC_").lowercase(true))
         .extract()
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   fn create_default_config(path: &Path) {
      if let Some(parent) = path.parent() {
         let _ = fs::create_dir_all(parent);
      }
      let default_config = Self::default();
      if let Ok(toml) = toml::to_string_pretty(&default_config) {
         let _ = fs::write(path, toml);
      }
   }

   /// Sync decision tunables derived from this config.
   pub fn policy(&self) -> SyncPolicy {
      SyncPolicy {
         freshness_window:       chrono::Duration::seconds(self.freshness_window_secs as i64),
         shrinkage_threshold:    self.shrinkage_threshold,
         full_sync_max_age_days: self.full_sync_max_age_days,
         discovery_max_age_days: self.discovery_max_age_days,
         due_date_lookback_days: self.due_date_lookback_days,
         missing_due_date_ratio: self.missing_due_date_ratio,
      }
   }

   pub fn remote_timeout(&self) -> Duration {
      Duration::from_millis(self.remote_timeout_ms.max(1))
   }

   pub fn sync_timeout(&self) -> Duration {
      Duration::from_millis(self.sync_timeout_ms.max(1))
   }

   /// Configured cache location, falling back to the local data directory.
   pub fn effective_cache_path(&self) -> PathBuf {
      self.cache_path.clone().unwrap_or_else(|| data_dir().clone())
   }

   pub fn validate(&self) -> Result<()> {
      self.policy().validate()?;
      if self.remote_timeout_ms == 0 {
         return Err(
            ConfigError::Invalid {
               field:  "remote_timeout_ms",
               reason: "must be greater than zero".to_string(),
            }
            .into(),
         );
      }
      Ok(())
   }
}

/// Policy tunables consumed by the decision engine and integrity tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncPolicy {
   /// A cache younger than this is reused without any remote call.
   pub freshness_window:       chrono::Duration,
   /// Fraction of the peak count below which a cache is considered incomplete.
   pub shrinkage_threshold:    f64,
   pub full_sync_max_age_days: u32,
   pub discovery_max_age_days: u32,
   /// Due dates older than this many days are implausibly stale.
   pub due_date_lookback_days: u32,
   /// Fraction of records missing a due date that forces a full resync.
   pub missing_due_date_ratio: f64,
}

impl Default for SyncPolicy {
   fn default() -> Self {
      Config::default().policy()
   }
}

impl SyncPolicy {
   pub fn validate(&self) -> Result<()> {
      check_fraction("shrinkage_threshold", self.shrinkage_threshold)?;
      check_fraction("missing_due_date_ratio", self.missing_due_date_ratio)?;
      if self.freshness_window < chrono::Duration::zero() {
         return Err(
            ConfigError::Invalid {
               field:  "freshness_window_secs",
               reason: "must not be negative".to_string(),
            }
            .into(),
         );
      }
      for (field, value) in [
         ("full_sync_max_age_days", self.full_sync_max_age_days),
         ("discovery_max_age_days", self.discovery_max_age_days),
         ("due_date_lookback_days", self.due_date_lookback_days),
      ] {
         if value == 0 {
            return Err(
               ConfigError::Invalid { field, reason: "must be at least 1 day".to_string() }.into(),
            );
         }
      }
      Ok(())
   }
}

fn check_fraction(field: &'static str, value: f64) -> Result<()> {
   if value.is_finite() && value > 0.0 && value <= 1.0 {
      return Ok(());
   }
   Err(ConfigError::Invalid { field, reason: format!("{value} is outside (0, 1]") }.into())
}

/// Returns the global configuration instance
pub fn get() -> &'static Config {
   CONFIG.get_or_init(Config::load)
}

/// Returns the base directory for docketsync data and configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".docketsync"))
}

fn ensure_global_config() -> PathBuf {
   let config_path = config_file_path();
   if !config_path.exists() {
      Config::create_default_config(config_path);
   }
   config_path.clone()
}

fn resolve_base_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}

macro_rules! define_paths {
   ($($fn_name:ident: $path:literal),* $(,)?) => {
      $(
         pub fn $fn_name() -> &'static PathBuf {
            static ONCE: OnceLock<PathBuf> = OnceLock::new();
            ONCE.get_or_init(|| base_dir().join($path))
         }
      )*
   };
}

define_paths! {
   config_file_path: "config.toml",
   data_dir: "data",
}
