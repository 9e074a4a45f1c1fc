//! Corpus enumeration for the local policy-manual directory.

use std::{
   fs,
   path::{Path, PathBuf},
};

use crate::{Result, config};

/// One readable document produced by a corpus scan.
#[derive(Debug, Clone)]
pub struct CorpusDocument {
   /// File name as shown to the operator and recorded on the remote side.
   pub display_name: String,
   pub path:         PathBuf,
   pub bytes:        Vec<u8>,
}

/// Outcome of one full corpus scan.
#[derive(Debug, Default)]
pub struct CorpusScan {
   pub documents:  Vec<CorpusDocument>,
   /// Files that matched the corpus filter but could not be read.
   pub unreadable: usize,
}

/// Abstraction over corpus enumeration so the reconciliation pass can be
/// driven from test fixtures.
pub trait Corpus {
   /// Enumerates all documents under the given root. Each call is a fresh,
   /// complete pass; there is no incremental watching.
   fn scan(&self, root: &Path) -> Result<CorpusScan>;
}

/// Local file system corpus: every `.pdf` file under the root directory.
pub struct LocalCorpus;

impl LocalCorpus {
   pub const fn new() -> Self {
      Self
   }

   fn is_pdf(path: &Path) -> bool {
      path
         .extension()
         .and_then(|e| e.to_str())
         .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
   }

   fn should_include(path: &Path, metadata: &fs::Metadata) -> bool {
      if !Self::is_pdf(path) {
         return false;
      }

      if let Some(filename) = path.file_name().and_then(|f| f.to_str())
         && filename.starts_with('.')
      {
         return false;
      }

      metadata.len() <= config::get().effective_max_document_size_bytes()
   }

   fn collect(dir: &Path, scan: &mut CorpusScan) {
      let Ok(entries) = fs::read_dir(dir) else {
         tracing::warn!("cannot read corpus directory {}", dir.display());
         return;
      };

      for entry in entries.filter_map(|e| e.ok()) {
         let path = entry.path();

         if let Some(filename) = path.file_name().and_then(|f| f.to_str())
            && filename.starts_with('.')
         {
            continue;
         }

         let Ok(file_type) = entry.file_type() else {
            continue;
         };

         if file_type.is_dir() {
            Self::collect(&path, scan);
            continue;
         }

         let Ok(metadata) = entry.metadata() else {
            continue;
         };

         if !Self::should_include(&path, &metadata) {
            continue;
         }

         match fs::read(&path) {
            Ok(bytes) => {
               let display_name = path
                  .file_name()
                  .and_then(|f| f.to_str())
                  .unwrap_or("unnamed.pdf")
                  .to_string();
               scan.documents.push(CorpusDocument { display_name, path, bytes });
            },
            Err(e) => {
               // Per-document read failures never abort the scan.
               tracing::warn!("excluding unreadable document {}: {}", path.display(), e);
               scan.unreadable += 1;
            },
         }
      }
   }
}

impl Corpus for LocalCorpus {
   fn scan(&self, root: &Path) -> Result<CorpusScan> {
      let mut scan = CorpusScan::default();

      if !root.exists() {
         tracing::warn!("corpus directory {} does not exist", root.display());
         return Ok(scan);
      }

      Self::collect(root, &mut scan);
      scan.documents.sort_by(|a, b| a.path.cmp(&b.path));
      Ok(scan)
   }
}

impl Default for LocalCorpus {
   fn default() -> Self {
      Self::new()
   }
}
