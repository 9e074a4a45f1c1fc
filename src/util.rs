//! Utility functions for filesystem operations

use std::{fs, path::Path};

use crate::Result;

/// Fsyncs a directory so a preceding rename survives a crash.
#[cfg(unix)]
pub fn fsync_dir(dir: &Path) -> Result<()> {
   let file = fs::File::open(dir)?;
   file.sync_all()?;
   Ok(())
}

#[cfg(not(unix))]
pub fn fsync_dir(_dir: &Path) -> Result<()> {
   Ok(())
}

/// Formats a byte count as a human-readable size string
pub fn format_size(bytes: u64) -> String {
   const KB: u64 = 1024;
   const MB: u64 = KB * 1024;
   const GB: u64 = MB * 1024;

   if bytes < KB {
      format!("{bytes} B")
   } else if bytes < MB {
      format!("{:.1} KB", bytes as f64 / KB as f64)
   } else if bytes < GB {
      format!("{:.1} MB", bytes as f64 / MB as f64)
   } else {
      format!("{:.1} GB", bytes as f64 / GB as f64)
   }
}

/// Current time as an RFC 3339 timestamp with second precision.
pub fn now_rfc3339() -> String {
   chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
