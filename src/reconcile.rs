//! Reconciliation engine: one full scan-compare-upload cycle.
//!
//! The pass owns the index exclusively. Upload workers run concurrently but
//! never touch the mapping; they report into a completion queue that the
//! coordinating pass drains, applying and persisting each result itself, so
//! no two writers ever race on the same fingerprint's entry.

use std::{
   collections::HashMap,
   path::{Path, PathBuf},
   sync::Arc,
   time::Duration,
};

use indicatif::ProgressBar;
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
   Result,
   config::Config,
   corpus::Corpus,
   fingerprint::{ContentHash, Fingerprint},
   gateway::UploadGateway,
   index::{EntryState, SyncIndex},
   pass_lock::PassLock,
   remote::{RemoteCatalog, RemoteError, RemoteHandle, RemoteStore},
};

/// Options for one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
   pub dry_run:       bool,
   /// Re-check `synced` entries against the catalog before trusting them.
   pub revalidate:    bool,
   /// Decision-phase mutations are persisted every this many entries.
   pub save_interval: usize,
   pub lock_dir:      PathBuf,
   pub lock_ttl:      Duration,
}

impl ReconcileOptions {
   pub fn from_config(cfg: &Config) -> Self {
      Self {
         dry_run:       false,
         revalidate:    cfg.revalidate_synced,
         save_interval: cfg.save_interval.max(1),
         lock_dir:      crate::config::locks_dir(),
         lock_ttl:      Duration::from_millis(cfg.pass_lock_ttl_ms),
      }
   }
}

/// One document the pass could not fully handle; the pass itself still
/// completes.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
   pub display_name: String,
   pub hash:         ContentHash,
   pub error:        String,
}

/// Result summary from a reconciliation pass
#[derive(Debug, Default, Serialize)]
pub struct SyncReport {
   pub pass_id:        String,
   pub scanned:        usize,
   pub distinct:       usize,
   pub unreadable:     usize,
   /// Entries already `synced` and left alone.
   pub already_synced: usize,
   /// Catalog hits bound without an upload.
   pub reused:         usize,
   pub uploaded:       usize,
   /// Entries left `pending` for the next pass.
   pub left_pending:   usize,
   pub newly_rejected: usize,
   pub failures:       Vec<DocumentFailure>,
   pub cancelled:      bool,
   pub duration_ms:    u64,
}

impl SyncReport {
   pub fn summary(&self) -> String {
      format!(
         "scanned={} reused={} uploaded={} pending={} rejected={} failures={}",
         self.scanned,
         self.reused,
         self.uploaded,
         self.left_pending,
         self.newly_rejected,
         self.failures.len(),
      )
   }
}

/// Progress snapshot emitted between fingerprint decisions and after each
/// completed upload.
#[derive(Debug, Clone)]
pub struct PassProgress {
   pub processed: usize,
   pub total:     usize,
   pub current:   Option<String>,
}

/// Trait for receiving pass progress updates
pub trait PassProgressCallback: Send {
   fn progress(&mut self, progress: PassProgress);
}

impl<F: FnMut(PassProgress) + Send> PassProgressCallback for F {
   fn progress(&mut self, progress: PassProgress) {
      self(progress);
   }
}

impl PassProgressCallback for () {
   fn progress(&mut self, _progress: PassProgress) {}
}

impl PassProgressCallback for ProgressBar {
   fn progress(&mut self, progress: PassProgress) {
      self.update(|state| {
         state.set_len(progress.total as u64);
         state.set_pos(progress.processed as u64);
      });
      if let Some(current) = progress.current {
         self.set_message(current);
      }
   }
}

/// One distinct content observed in the scan, with every local name that
/// carries it.
struct Candidate {
   fingerprint: Fingerprint,
   names:       Vec<String>,
   bytes:       Arc<Vec<u8>>,
}

impl Candidate {
   fn name_strs(&self) -> impl Iterator<Item = &str> {
      self.names.iter().map(String::as_str)
   }

   fn primary_name(&self) -> &str {
      self.names.first().map_or("unnamed.pdf", String::as_str)
   }
}

/// Engine for reconciling the local corpus against the remote store
pub struct Reconciler<C: Corpus, R: RemoteStore + 'static> {
   corpus:  C,
   remote:  Arc<R>,
   gateway: Arc<UploadGateway<R>>,
}

impl<C, R> Reconciler<C, R>
where
   C: Corpus,
   R: RemoteStore + 'static,
{
   pub fn new(corpus: C, remote: Arc<R>, gateway: UploadGateway<R>) -> Self {
      Self { corpus, remote, gateway: Arc::new(gateway) }
   }

   /// Runs one reconciliation pass over `root`, mutating and persisting
   /// `index`. Per-document failures are collected into the report; only
   /// index corruption or pass-lock contention abort the pass.
   pub async fn run(
      &self,
      root: &Path,
      index: &mut SyncIndex,
      options: &ReconcileOptions,
      cancel: &CancellationToken,
      callback: &mut dyn PassProgressCallback,
   ) -> Result<SyncReport> {
      let _lock = PassLock::acquire_at(&options.lock_dir, options.lock_ttl)?;
      let started = std::time::Instant::now();

      let scan = self.corpus.scan(root)?;
      let mut report = SyncReport {
         pass_id: uuid::Uuid::new_v4().to_string(),
         scanned: scan.documents.len(),
         unreadable: scan.unreadable,
         ..SyncReport::default()
      };
      tracing::debug!("reconciliation pass {} started", report.pass_id);

      if scan.documents.is_empty() {
         tracing::warn!("no PDF documents found under {}", root.display());
      }

      let candidates = group_by_fingerprint(scan.documents.into_iter().map(|doc| {
         (doc.display_name, doc.bytes)
      }));
      report.distinct = candidates.len();
      let by_hash: HashMap<ContentHash, usize> = candidates
         .iter()
         .enumerate()
         .map(|(i, c)| (c.fingerprint.hash, i))
         .collect();

      let total = candidates.len();
      let mut to_upload: Vec<usize> = Vec::new();
      let mut since_save = 0usize;

      for (processed, candidate) in candidates.iter().enumerate() {
         if cancel.is_cancelled() {
            report.cancelled = true;
            break;
         }

         callback.progress(PassProgress {
            processed,
            total,
            current: Some(candidate.primary_name().to_string()),
         });

         if self.decide(index, candidate, options, &mut report, &mut to_upload, processed).await {
            since_save += 1;
         }

         if since_save >= options.save_interval {
            index.save()?;
            since_save = 0;
         }
      }

      index.save()?;

      if options.dry_run {
         report.left_pending = to_upload.len();
      } else {
         self
            .upload_batch(index, &candidates, &by_hash, &to_upload, cancel, &mut report, callback)
            .await?;
      }

      report.duration_ms = started.elapsed().as_millis() as u64;
      index.record_pass(&report.summary());
      index.save()?;

      callback.progress(PassProgress { processed: total, total, current: None });
      Ok(report)
   }

   /// Applies the per-fingerprint decision algorithm. Returns whether the
   /// index was mutated.
   async fn decide(
      &self,
      index: &mut SyncIndex,
      candidate: &Candidate,
      options: &ReconcileOptions,
      report: &mut SyncReport,
      to_upload: &mut Vec<usize>,
      candidate_idx: usize,
   ) -> bool {
      let fingerprint = candidate.fingerprint;
      let hash = fingerprint.hash;
      let state = index.entry(hash).map(|e| e.state);

      match state {
         Some(EntryState::Synced) => {
            index.observe_names(hash, candidate.name_strs());
            if !options.revalidate {
               report.already_synced += 1;
               return true;
            }

            match self.remote.resolve(hash).await {
               Ok(handle) if handle.hash == hash => {
                  report.already_synced += 1;
                  true
               },
               Ok(handle) => {
                  // The catalog acknowledged different content for this
                  // hash; do not overwrite silently.
                  index.mark_rejected(
                     fingerprint,
                     &format!("catalog resolved {hash} to mismatched content {}", handle.hash),
                     candidate.name_strs(),
                  );
                  report.newly_rejected += 1;
                  true
               },
               Err(RemoteError::NotFound) => {
                  // Only an explicit not-found invalidates the handle.
                  index.mark_stale(hash);
                  index.mark_pending(fingerprint, candidate.name_strs());
                  to_upload.push(candidate_idx);
                  true
               },
               Err(err) => {
                  // Transient failure during re-validation is "unknown",
                  // not "not found"; the entry stays synced.
                  tracing::warn!(
                     "re-validation of {} inconclusive: {err}",
                     candidate.primary_name()
                  );
                  report.already_synced += 1;
                  true
               },
            }
         },
         Some(EntryState::Rejected) => {
            index.observe_names(hash, candidate.name_strs());
            tracing::debug!(
               "skipping {}: remote store permanently rejected this content",
               candidate.primary_name()
            );
            true
         },
         None | Some(EntryState::Pending) | Some(EntryState::Stale) => {
            // The content may already exist remotely under a handle this
            // index never recorded (e.g. re-added after deletion), so ask
            // the catalog once before deciding to upload.
            match self.remote.resolve(hash).await {
               Ok(handle) if handle.hash == hash => {
                  index.mark_synced(fingerprint, handle, candidate.name_strs());
                  report.reused += 1;
                  true
               },
               Ok(handle) => {
                  index.mark_rejected(
                     fingerprint,
                     &format!("catalog resolved {hash} to mismatched content {}", handle.hash),
                     candidate.name_strs(),
                  );
                  report.newly_rejected += 1;
                  true
               },
               Err(RemoteError::NotFound) => {
                  index.mark_pending(fingerprint, candidate.name_strs());
                  to_upload.push(candidate_idx);
                  true
               },
               Err(err) => {
                  // Unknown whether the content exists remotely; uploading
                  // anyway could duplicate it. Skip this document for the
                  // pass and report the failure.
                  report.failures.push(DocumentFailure {
                     display_name: candidate.primary_name().to_string(),
                     hash,
                     error: err.to_string(),
                  });
                  if state.is_some() {
                     report.left_pending += 1;
                  }
                  tracing::warn!(
                     "catalog lookup for {} failed: {err}",
                     candidate.primary_name()
                  );
                  false
               },
            }
         },
      }
   }

   /// Dispatches the pass's pending uploads on a bounded worker pool and
   /// applies results as they complete. The index is only mutated here, on
   /// the coordinating task.
   #[allow(clippy::too_many_arguments, reason = "coordinator wiring")]
   async fn upload_batch(
      &self,
      index: &mut SyncIndex,
      candidates: &[Candidate],
      by_hash: &HashMap<ContentHash, usize>,
      to_upload: &[usize],
      cancel: &CancellationToken,
      report: &mut SyncReport,
      callback: &mut dyn PassProgressCallback,
   ) -> Result<()> {
      let (tx, mut rx) =
         mpsc::unbounded_channel::<(Fingerprint, String, Result<RemoteHandle, RemoteError>)>();
      let mut join_set = JoinSet::new();
      let mut dispatched = 0usize;

      for &idx in to_upload {
         // Uploads not yet started when cancellation arrives are simply
         // not issued; their entries stay pending for the next pass.
         if cancel.is_cancelled() {
            report.cancelled = true;
            break;
         }

         let candidate = &candidates[idx];
         let gateway = Arc::clone(&self.gateway);
         let bytes = Arc::clone(&candidate.bytes);
         let name = candidate.primary_name().to_string();
         let fingerprint = candidate.fingerprint;
         let tx = tx.clone();

         join_set.spawn(async move {
            let result = gateway.upload(&name, &bytes, fingerprint).await;
            let _ = tx.send((fingerprint, name, result));
         });
         dispatched += 1;
      }
      drop(tx);

      report.left_pending += to_upload.len() - dispatched;

      let mut completed = 0usize;
      while let Some((fingerprint, name, result)) = rx.recv().await {
         completed += 1;
         let names: Vec<&str> = by_hash
            .get(&fingerprint.hash)
            .map(|&i| candidates[i].name_strs().collect())
            .unwrap_or_default();

         match result {
            Ok(handle) => {
               index.mark_synced(fingerprint, handle, names);
               report.uploaded += 1;
            },
            Err(RemoteError::Rejected(reason)) => {
               index.mark_rejected(fingerprint, &reason, names);
               report.newly_rejected += 1;
               report.failures.push(DocumentFailure {
                  display_name: name.clone(),
                  hash: fingerprint.hash,
                  error: reason,
               });
            },
            Err(err) => {
               // Transient exhaustion: the entry stays pending and the
               // next pass retries. No re-retry within this pass.
               report.left_pending += 1;
               report.failures.push(DocumentFailure {
                  display_name: name.clone(),
                  hash: fingerprint.hash,
                  error: err.to_string(),
               });
            },
         }

         // Upload results are not re-derivable from a rescan; persist each
         // one as soon as it is recorded.
         index.save()?;

         callback.progress(PassProgress {
            processed: completed,
            total: dispatched,
            current: Some(name),
         });
      }

      while join_set.join_next().await.is_some() {}
      Ok(())
   }
}

fn group_by_fingerprint(docs: impl Iterator<Item = (String, Vec<u8>)>) -> Vec<Candidate> {
   let mut candidates: Vec<Candidate> = Vec::new();
   let mut by_hash: HashMap<ContentHash, usize> = HashMap::new();

   for (display_name, bytes) in docs {
      let fingerprint = Fingerprint::compute(&bytes);
      match by_hash.get(&fingerprint.hash) {
         Some(&i) => {
            if !candidates[i].names.contains(&display_name) {
               candidates[i].names.push(display_name);
            }
         },
         None => {
            by_hash.insert(fingerprint.hash, candidates.len());
            candidates.push(Candidate {
               fingerprint,
               names: vec![display_name],
               bytes: Arc::new(bytes),
            });
         },
      }
   }

   candidates
}
