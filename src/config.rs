//! Configuration management for remote endpoints, upload pacing, and paths.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub const MAX_DOCUMENT_SIZE_BYTES_CAP: u64 = 52_428_800;
pub const MAX_UPLOAD_WORKERS_CAP: usize = 16;
pub const MAX_UPLOADS_PER_INTERVAL_CAP: usize = 64;

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   /// Directory scanned for PDF policy manuals.
   pub corpus_dir: PathBuf,

   pub remote_base_url: String,
   pub api_key_env:     String,

   pub max_document_size_bytes: u64,

   pub upload_workers: usize,
   pub max_uploads_per_interval: usize,
   pub upload_interval_ms: u64,

   pub rate_limit_max_attempts: u32,
   pub unavailable_max_attempts: u32,
   pub retry_base_delay_ms: u64,
   pub retry_multiplier: u32,

   pub remote_timeout_ms: u64,
   pub remote_page_size:  usize,

   pub revalidate_synced: bool,
   pub pass_lock_ttl_ms:  u64,
   pub save_interval:     usize,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         corpus_dir: PathBuf::from("docs"),
         remote_base_url: "https://api.example-docstore.dev".to_string(),
         api_key_env: "DOCSYNC_API_KEY".to_string(),
         max_document_size_bytes: MAX_DOCUMENT_SIZE_BYTES_CAP,
         upload_workers: 4,
         max_uploads_per_interval: 8,
         upload_interval_ms: 10_000,
         rate_limit_max_attempts: 4,
         unavailable_max_attempts: 2,
         retry_base_delay_ms: 500,
         retry_multiplier: 2,
         remote_timeout_ms: 30_000,
         remote_page_size: 100,
         revalidate_synced: false,
         pass_lock_ttl_ms: 120_000,
         save_interval: 16,
      }
   }
}

impl Config {
   pub fn load() -> Self {
      let config_path = ensure_global_config();

      Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(config_path))
         .merge(Env::prefixed("DOCSYNC_").lowercase(true))
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

   /// Upload worker count, capped and at least one
   pub fn effective_upload_workers(&self) -> usize {
      self.upload_workers.min(MAX_UPLOAD_WORKERS_CAP).max(1)
   }

   pub fn effective_max_uploads_per_interval(&self) -> usize {
      self
         .max_uploads_per_interval
         .min(MAX_UPLOADS_PER_INTERVAL_CAP)
         .max(1)
   }

   pub fn effective_max_document_size_bytes(&self) -> u64 {
      self.max_document_size_bytes.min(MAX_DOCUMENT_SIZE_BYTES_CAP)
   }

   /// Reads the remote API key from the configured environment variable.
   pub fn api_key(&self) -> Result<String> {
      std::env::var(&self.api_key_env)
         .map_err(|_| ConfigError::MissingApiKey(self.api_key_env.clone()).into())
   }
}

/// Returns the global configuration instance
pub fn get() -> &'static Config {
   CONFIG.get_or_init(Config::load)
}

/// Returns the base directory for docsync data and configuration
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".docsync"))
}

/// Path of the durable sync index file.
pub fn index_path() -> PathBuf {
   base_dir().join("index.json")
}

/// Directory holding the pass lock file.
pub fn locks_dir() -> PathBuf {
   base_dir().join("locks")
}

fn config_file_path() -> PathBuf {
   base_dir().join("config.toml")
}

fn ensure_global_config() -> PathBuf {
   let config_path = config_file_path();
   if !config_path.exists() {
      Config::create_default_config(&config_path);
   }
   config_path
}

fn resolve_base_dir(name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|dirs| dirs.home_dir().join(name))
      .unwrap_or_else(|| PathBuf::from(name))
}

pub fn validate(cfg: &Config) -> Result<()> {
   if cfg.max_document_size_bytes > MAX_DOCUMENT_SIZE_BYTES_CAP {
      return Err(
         ConfigError::Invalid(format!(
            "max_document_size_bytes {} exceeds hard cap {}",
            cfg.max_document_size_bytes, MAX_DOCUMENT_SIZE_BYTES_CAP
         ))
         .into(),
      );
   }
   if cfg.upload_workers == 0 {
      return Err(ConfigError::Invalid("upload_workers must be at least 1".to_string()).into());
   }
   if cfg.rate_limit_max_attempts == 0 || cfg.unavailable_max_attempts == 0 {
      return Err(
         ConfigError::Invalid("retry attempt bounds must be at least 1".to_string()).into(),
      );
   }
   Ok(())
}
