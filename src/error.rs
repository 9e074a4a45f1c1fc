use std::{io, path::PathBuf};

use thiserror::Error;

use crate::remote::RemoteError;

/// Main error type for the docsync application.
///
/// This enum represents all possible errors that can occur throughout the
/// application, including local I/O, index persistence, remote store and
/// catalog operations, configuration, and pass-level coordination failures.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred during file operations.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// TOML serialization or deserialization error occurred.
   #[error("toml error: {0}")]
   Toml(#[from] toml::de::Error),

   /// Error occurred in the remote store or catalog layer.
   #[error("remote error: {0}")]
   Remote(#[from] RemoteError),

   /// Error occurred loading or saving the sync index.
   #[error("persistence error: {0}")]
   Persistence(#[from] PersistenceError),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// A reconciliation pass is already running for this index.
   #[error("reconciliation pass already running (held by pid {holder})")]
   PassLocked { holder: u32 },

   /// Failed to acquire the pass lock for a non-contention reason.
   #[error("failed to acquire pass lock: {0}")]
   PassLockAcquire(#[source] io::Error),

   /// No synced document with the requested display name.
   #[error("no synced document named '{0}'")]
   Unresolved(String),
}

impl Error {
   /// Maps error kinds to process exit codes for the CLI.
   pub const fn exit_code(&self) -> i32 {
      match self {
         Error::PassLocked { .. } => 10,
         Error::Persistence(PersistenceError::Corrupt { .. })
         | Error::Persistence(PersistenceError::SchemaVersion { .. }) => 13,
         _ => 1,
      }
   }
}

/// Errors that can occur loading or saving the durable sync index.
///
/// Corruption is fatal to a reconciliation pass: proceeding with an
/// unreliable mapping risks duplicate uploads, so these are surfaced
/// distinctly from transient errors and never retried.
#[derive(Debug, Error)]
pub enum PersistenceError {
   /// Index file exists but cannot be parsed or is internally inconsistent.
   #[error("index file {} is corrupt: {reason}", .path.display())]
   Corrupt { path: PathBuf, reason: String },

   /// Index file was written by a newer, incompatible schema.
   #[error("index schema version {found} is newer than supported version {supported}")]
   SchemaVersion { found: u32, supported: u32 },

   /// Failed to read the index file.
   #[error("failed to read index: {0}")]
   Read(#[source] io::Error),

   /// Failed to write the index file.
   #[error("failed to write index: {0}")]
   Write(#[source] io::Error),
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// Failed to retrieve user directories (e.g., home directory).
   #[error("failed to get user directories")]
   GetUserDirectories,

   /// The configured API key environment variable is not set.
   #[error("api key environment variable {0} is not set")]
   MissingApiKey(String),

   /// Config value is invalid or exceeds safety caps.
   #[error("invalid config: {0}")]
   Invalid(String),
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
