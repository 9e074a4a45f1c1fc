//! Durable mapping from content fingerprints to remote handles.
//!
//! The index is the only shared mutable state in the system. It is owned by
//! the reconciliation pass, loaded once at startup, and written back with an
//! atomic temp-file-then-rename after mutations, so a crash mid-save leaves
//! either the old or the new mapping, never a partial one.

use std::{
   collections::{BTreeSet, HashMap},
   fs,
   io::Write,
   path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
   Result,
   error::PersistenceError,
   fingerprint::{ContentHash, Fingerprint},
   remote::RemoteHandle,
   util::{fsync_dir, now_rfc3339},
};

pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Lifecycle state of one index entry.
///
/// `synced` never regresses directly to `pending`; it passes through
/// `stale`, and only on an explicit not-found from the catalog. `rejected`
/// is terminal: the remote store will never accept this content, so passes
/// stop re-attempting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
   Pending,
   Synced,
   Stale,
   Rejected,
}

impl EntryState {
   pub const fn as_str(self) -> &'static str {
      match self {
         Self::Pending => "pending",
         Self::Synced => "synced",
         Self::Stale => "stale",
         Self::Rejected => "rejected",
      }
   }
}

/// One row of the index: a fingerprint mapped to at most one remote handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
   pub fingerprint: Fingerprint,
   pub state:       EntryState,
   /// Bound handle. Always present when `synced`; retained on `stale` for
   /// operator inspection until a re-upload replaces it.
   #[serde(default)]
   pub handle:      Option<RemoteHandle>,
   /// Local display names currently carrying this content. A name moves to
   /// another entry when its file's content changes; the entry itself is
   /// never deleted by a scan.
   #[serde(default)]
   pub names:       BTreeSet<String>,
   #[serde(default)]
   pub updated_at:  String,
   #[serde(default)]
   pub rejected_reason: Option<String>,
}

/// Per-state entry counts, for status output.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct StateCounts {
   pub pending:  usize,
   pub synced:   usize,
   pub stale:    usize,
   pub rejected: usize,
}

/// Persistent fingerprint → entry mapping.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncIndex {
   schema_version: u32,
   #[serde(default)]
   entries:        HashMap<ContentHash, IndexEntry>,
   #[serde(default)]
   last_pass_at:   Option<String>,
   #[serde(default)]
   last_pass_summary: Option<String>,
   #[serde(skip)]
   path:           PathBuf,
   #[serde(skip)]
   dirty:          bool,
}

impl SyncIndex {
   /// Loads the index from disk, creating an empty one if the file does not
   /// exist. A file that exists but cannot be parsed, or whose entries are
   /// internally inconsistent, is a fatal [`PersistenceError`]: the system
   /// refuses to run a pass against an unreliable mapping.
   pub fn load(path: &Path) -> Result<Self> {
      if !path.exists() {
         return Ok(Self {
            schema_version: INDEX_SCHEMA_VERSION,
            entries: HashMap::new(),
            last_pass_at: None,
            last_pass_summary: None,
            path: path.to_path_buf(),
            dirty: false,
         });
      }

      let raw = fs::read_to_string(path).map_err(PersistenceError::Read)?;
      let mut index: Self = serde_json::from_str(&raw).map_err(|e| PersistenceError::Corrupt {
         path:   path.to_path_buf(),
         reason: e.to_string(),
      })?;

      if index.schema_version > INDEX_SCHEMA_VERSION {
         return Err(
            PersistenceError::SchemaVersion {
               found:     index.schema_version,
               supported: INDEX_SCHEMA_VERSION,
            }
            .into(),
         );
      }

      index.verify_consistency(path)?;
      index.path = path.to_path_buf();
      index.dirty = false;
      Ok(index)
   }

   fn verify_consistency(&self, path: &Path) -> Result<()> {
      let corrupt = |reason: String| PersistenceError::Corrupt {
         path:   path.to_path_buf(),
         reason,
      };

      for (hash, entry) in &self.entries {
         if entry.fingerprint.hash != *hash {
            return Err(corrupt(format!("entry key {hash} disagrees with its fingerprint")).into());
         }
         if entry.state == EntryState::Synced && entry.handle.is_none() {
            return Err(corrupt(format!("synced entry {hash} has no remote handle")).into());
         }
         if let Some(handle) = &entry.handle
            && handle.hash != entry.fingerprint.hash
         {
            return Err(corrupt(format!("entry {hash} bound to a handle for different content")).into());
         }
      }
      Ok(())
   }

   /// Saves the index to disk if dirty. Write-to-temp-then-rename with a
   /// directory fsync, so a crash cannot leave a partially-written file.
   pub fn save(&mut self) -> Result<()> {
      if !self.dirty {
         return Ok(());
      }

      if let Some(parent) = self.path.parent() {
         fs::create_dir_all(parent).map_err(PersistenceError::Write)?;
      }

      let tmp_path = self.path.with_extension("json.tmp");
      let data = serde_json::to_string_pretty(&self)?;
      {
         let mut file = fs::File::create(&tmp_path).map_err(PersistenceError::Write)?;
         file
            .write_all(data.as_bytes())
            .map_err(PersistenceError::Write)?;
         file.sync_all().map_err(PersistenceError::Write)?;
      }
      fs::rename(&tmp_path, &self.path).map_err(PersistenceError::Write)?;
      if let Some(parent) = self.path.parent() {
         fsync_dir(parent)?;
      }

      self.dirty = false;
      Ok(())
   }

   pub fn entry(&self, hash: ContentHash) -> Option<&IndexEntry> {
      self.entries.get(&hash)
   }

   pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
      self.entries.values()
   }

   pub fn len(&self) -> usize {
      self.entries.len()
   }

   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }

   /// Adds display names to an existing entry without touching its state.
   /// Names are unique across entries: claiming one removes it from the
   /// entry that previously held it.
   pub fn observe_names<'a>(
      &mut self,
      hash: ContentHash,
      names: impl IntoIterator<Item = &'a str>,
   ) {
      if !self.entries.contains_key(&hash) {
         return;
      }
      self.claim_names(hash, names);
   }

   fn claim_names<'a>(&mut self, hash: ContentHash, names: impl IntoIterator<Item = &'a str>) {
      for name in names {
         for (other_hash, entry) in &mut self.entries {
            if *other_hash != hash && entry.names.remove(name) {
               self.dirty = true;
            }
         }
         if let Some(entry) = self.entries.get_mut(&hash)
            && entry.names.insert(name.to_string())
         {
            self.dirty = true;
         }
      }
   }

   /// Marks a fingerprint `pending` (upload required). Creates the entry if
   /// absent. A `synced` entry is left untouched: it never regresses to
   /// `pending` without passing through `stale` first. A `rejected` entry is
   /// terminal and is also left untouched.
   pub fn mark_pending<'a>(
      &mut self,
      fingerprint: Fingerprint,
      names: impl IntoIterator<Item = &'a str>,
   ) {
      match self.entries.get_mut(&fingerprint.hash) {
         None => {
            self.entries.insert(fingerprint.hash, IndexEntry {
               fingerprint,
               state: EntryState::Pending,
               handle: None,
               names: BTreeSet::new(),
               updated_at: now_rfc3339(),
               rejected_reason: None,
            });
            self.dirty = true;
         },
         Some(entry) => match entry.state {
            EntryState::Synced | EntryState::Rejected | EntryState::Pending => {},
            EntryState::Stale => {
               entry.state = EntryState::Pending;
               entry.updated_at = now_rfc3339();
               self.dirty = true;
            },
         },
      }
      self.claim_names(fingerprint.hash, names);
   }

   /// Binds a confirmed remote handle and marks the entry `synced`.
   pub fn mark_synced<'a>(
      &mut self,
      fingerprint: Fingerprint,
      handle: RemoteHandle,
      names: impl IntoIterator<Item = &'a str>,
   ) {
      let entry = self
         .entries
         .entry(fingerprint.hash)
         .or_insert_with(|| IndexEntry {
            fingerprint,
            state: EntryState::Pending,
            handle: None,
            names: BTreeSet::new(),
            updated_at: now_rfc3339(),
            rejected_reason: None,
         });
      entry.state = EntryState::Synced;
      entry.handle = Some(handle);
      entry.rejected_reason = None;
      entry.updated_at = now_rfc3339();
      self.dirty = true;
      self.claim_names(fingerprint.hash, names);
   }

   /// Transitions a `synced` entry to `stale` after an explicit not-found
   /// from the catalog. Any other state is left unchanged; in particular a
   /// transient catalog failure must never call this.
   pub fn mark_stale(&mut self, hash: ContentHash) {
      if let Some(entry) = self.entries.get_mut(&hash)
         && entry.state == EntryState::Synced
      {
         entry.state = EntryState::Stale;
         entry.updated_at = now_rfc3339();
         self.dirty = true;
      }
   }

   /// Marks a fingerprint permanently `rejected`.
   pub fn mark_rejected<'a>(
      &mut self,
      fingerprint: Fingerprint,
      reason: &str,
      names: impl IntoIterator<Item = &'a str>,
   ) {
      let entry = self
         .entries
         .entry(fingerprint.hash)
         .or_insert_with(|| IndexEntry {
            fingerprint,
            state: EntryState::Pending,
            handle: None,
            names: BTreeSet::new(),
            updated_at: now_rfc3339(),
            rejected_reason: None,
         });
      entry.state = EntryState::Rejected;
      entry.rejected_reason = Some(reason.to_string());
      entry.updated_at = now_rfc3339();
      self.dirty = true;
      self.claim_names(fingerprint.hash, names);
   }

   /// Resolves a local display name to the remote handle downstream
   /// consumers should query against. Names are unique across entries, so
   /// at most one entry can match.
   pub fn resolve_name(&self, name: &str) -> Option<&RemoteHandle> {
      self
         .entries
         .values()
         .find(|e| e.state == EntryState::Synced && e.names.contains(name))
         .and_then(|e| e.handle.as_ref())
   }

   pub fn state_counts(&self) -> StateCounts {
      let mut counts = StateCounts::default();
      for entry in self.entries.values() {
         match entry.state {
            EntryState::Pending => counts.pending += 1,
            EntryState::Synced => counts.synced += 1,
            EntryState::Stale => counts.stale += 1,
            EntryState::Rejected => counts.rejected += 1,
         }
      }
      counts
   }

   pub fn record_pass(&mut self, summary: &str) {
      self.last_pass_at = Some(now_rfc3339());
      self.last_pass_summary = Some(summary.to_string());
      self.dirty = true;
   }

   pub fn last_pass_at(&self) -> Option<&str> {
      self.last_pass_at.as_deref()
   }

   pub fn last_pass_summary(&self) -> Option<&str> {
      self.last_pass_summary.as_deref()
   }

   pub fn path(&self) -> &Path {
      &self.path
   }
}
