mod support;

use std::{fs, sync::Arc, time::Duration};

use docsync::{
   Error,
   corpus::LocalCorpus,
   error::PersistenceError,
   gateway::{GatewayLimits, RetryPolicy, UploadGateway},
   index::{EntryState, SyncIndex},
   reconcile::{ReconcileOptions, Reconciler},
};
use support::{MemoryRemote, set_temp_home};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn limits() -> GatewayLimits {
   GatewayLimits {
      max_in_flight:        4,
      max_per_interval:     64,
      interval:             Duration::from_millis(50),
      rate_limit_policy:    RetryPolicy::new(4, Duration::from_millis(1), 2),
      unavailable_attempts: 2,
   }
}

#[tokio::test]
async fn pass_state_survives_reload() {
   set_temp_home();
   let corpus = TempDir::new().unwrap();
   let state = TempDir::new().unwrap();
   fs::write(corpus.path().join("a.pdf"), b"%PDF-1.7 a").unwrap();

   let remote = Arc::new(MemoryRemote::new());
   let gateway = UploadGateway::new(Arc::clone(&remote), limits());
   let reconciler = Reconciler::new(LocalCorpus::new(), Arc::clone(&remote), gateway);

   let index_path = state.path().join("index.json");
   let options = ReconcileOptions {
      dry_run:       false,
      revalidate:    false,
      save_interval: 4,
      lock_dir:      state.path().join("locks"),
      lock_ttl:      Duration::from_secs(60),
   };

   let mut index = SyncIndex::load(&index_path).unwrap();
   reconciler
      .run(corpus.path(), &mut index, &options, &CancellationToken::new(), &mut ())
      .await
      .unwrap();
   drop(index);

   // A fresh process sees the completed mapping.
   let reloaded = SyncIndex::load(&index_path).unwrap();
   assert_eq!(reloaded.state_counts().synced, 1);
   assert!(reloaded.resolve_name("a.pdf").is_some());
   assert!(reloaded.last_pass_at().is_some());
}

#[test]
fn interrupted_save_leaves_previous_mapping_intact() {
   let state = TempDir::new().unwrap();
   let index_path = state.path().join("index.json");

   let mut index = SyncIndex::load(&index_path).unwrap();
   let f = docsync::fingerprint::Fingerprint::compute(b"%PDF-1.7 a");
   index.mark_pending(f, ["a.pdf"]);
   index.save().unwrap();

   // A crash mid-save leaves only a temp file; the real index file is
   // replaced atomically or not at all.
   fs::write(index_path.with_extension("json.tmp"), b"{ \"trunca").unwrap();

   let reloaded = SyncIndex::load(&index_path).unwrap();
   assert_eq!(reloaded.entry(f.hash).unwrap().state, EntryState::Pending);
}

#[test]
fn corrupt_index_refuses_to_load() {
   let state = TempDir::new().unwrap();
   let index_path = state.path().join("index.json");
   fs::write(&index_path, b"definitely not json").unwrap();

   let err = SyncIndex::load(&index_path).unwrap_err();
   assert!(matches!(
      err,
      Error::Persistence(PersistenceError::Corrupt { .. })
   ));
}

#[tokio::test]
async fn corrupt_index_aborts_before_any_remote_work() {
   set_temp_home();
   let state = TempDir::new().unwrap();
   let index_path = state.path().join("index.json");
   fs::write(&index_path, b"definitely not json").unwrap();

   // Loading is the gate: no pass can start against a corrupt mapping.
   assert!(SyncIndex::load(&index_path).is_err());
}

#[test]
fn concurrent_pass_rejected() {
   let state = TempDir::new().unwrap();
   let lock_dir = state.path().join("locks");

   let held = docsync::pass_lock::PassLock::acquire_at(&lock_dir, Duration::from_secs(60)).unwrap();
   let err =
      docsync::pass_lock::PassLock::acquire_at(&lock_dir, Duration::from_secs(60)).unwrap_err();
   assert!(matches!(err, Error::PassLocked { .. }));
   drop(held);
}
