//! Resolves a local display name to its remote handle.
//!
//! This is the lookup the downstream extraction pipeline performs to learn
//! which remote document to query against.

use serde::Serialize;

use crate::{Error, Result, config, index::SyncIndex};

#[derive(Serialize)]
struct ResolveJson<'a> {
   schema_version: u32,
   display_name:   &'a str,
   handle_id:      &'a str,
   uploaded_at:    &'a str,
   hash:           String,
}

pub fn execute(name: &str, json: bool) -> Result<()> {
   let index = SyncIndex::load(&config::index_path())?;

   let Some(handle) = index.resolve_name(name) else {
      return Err(Error::Unresolved(name.to_string()));
   };

   if json {
      let out = ResolveJson {
         schema_version: 1,
         display_name: name,
         handle_id: &handle.id,
         uploaded_at: &handle.uploaded_at,
         hash: handle.hash.to_string(),
      };
      println!("{}", serde_json::to_string_pretty(&out)?);
   } else {
      println!("{} -> {} (uploaded {})", name, handle.id, handle.uploaded_at);
   }

   Ok(())
}
