//! Removes the local index and lock files.
//!
//! Remote documents are untouched; the next pass rebuilds the mapping from
//! the catalog without re-uploading anything it can resolve.

use std::fs;

use console::style;

use crate::{Result, config, util::format_size};

pub fn execute(force: bool) -> Result<()> {
   let index_path = config::index_path();
   let locks_dir = config::locks_dir();

   if !index_path.exists() {
      println!("nothing to clean");
      return Ok(());
   }

   let size = fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

   if !force {
      println!(
         "would remove {} ({}); re-run with --force to delete",
         index_path.display(),
         format_size(size)
      );
      return Ok(());
   }

   fs::remove_file(&index_path)?;
   if locks_dir.exists() {
      let _ = fs::remove_dir_all(&locks_dir);
   }
   println!("{} removed {}", style("clean:").bold(), index_path.display());

   Ok(())
}
