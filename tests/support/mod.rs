#![allow(dead_code)]

use std::{
   collections::{HashMap, VecDeque},
   sync::{
      OnceLock,
      atomic::{AtomicUsize, Ordering},
   },
   time::Duration,
};

use async_trait::async_trait;
use docsync::{
   fingerprint::ContentHash,
   remote::{CatalogPage, RemoteCatalog, RemoteError, RemoteHandle, RemoteStore},
   util::now_rfc3339,
};
use parking_lot::Mutex;
use tempfile::TempDir;

static TEST_HOME: OnceLock<TempDir> = OnceLock::new();

/// Points HOME at a process-lifetime temp directory so the config layer
/// never touches the real home directory.
pub fn set_temp_home() {
   let dir = TEST_HOME.get_or_init(|| TempDir::new().expect("temp home"));
   // SAFETY: tests only; set before the config OnceLock first resolves HOME.
   unsafe {
      std::env::set_var("HOME", dir.path());
   }
}

/// In-memory remote store double with scripted failures and dispatch
/// accounting.
#[derive(Default)]
pub struct MemoryRemote {
   files:          Mutex<HashMap<ContentHash, RemoteHandle>>,
   upload_errors:  Mutex<VecDeque<RemoteError>>,
   resolve_errors: Mutex<VecDeque<RemoteError>>,
   /// Upload attempts that reached the remote, including scripted failures.
   pub upload_attempts: AtomicUsize,
   pub resolve_calls:   AtomicUsize,
   in_flight:       AtomicUsize,
   pub peak_in_flight: AtomicUsize,
   upload_delay:    Mutex<Option<Duration>>,
   page_size:       AtomicUsize,
}

impl MemoryRemote {
   pub fn new() -> Self {
      let remote = Self::default();
      remote.page_size.store(2, Ordering::SeqCst);
      remote
   }

   pub fn make_handle(hash: ContentHash, display_name: &str) -> RemoteHandle {
      RemoteHandle {
         id: format!("files/{}", uuid::Uuid::new_v4()),
         uploaded_at: now_rfc3339(),
         hash,
         display_name: Some(display_name.to_string()),
      }
   }

   /// Seeds the catalog with an already-uploaded document.
   pub fn insert(&self, bytes: &[u8], display_name: &str) -> RemoteHandle {
      let hash = ContentHash::sum(bytes);
      let handle = Self::make_handle(hash, display_name);
      self.files.lock().insert(hash, handle.clone());
      handle
   }

   pub fn remove(&self, hash: ContentHash) {
      self.files.lock().remove(&hash);
   }

   pub fn contains(&self, hash: ContentHash) -> bool {
      self.files.lock().contains_key(&hash)
   }

   pub fn stored(&self) -> usize {
      self.files.lock().len()
   }

   /// The next upload attempt fails with `err`; queued errors apply in
   /// order, one per attempt.
   pub fn fail_next_upload(&self, err: RemoteError) {
      self.upload_errors.lock().push_back(err);
   }

   pub fn fail_next_resolve(&self, err: RemoteError) {
      self.resolve_errors.lock().push_back(err);
   }

   pub fn set_upload_delay(&self, delay: Duration) {
      *self.upload_delay.lock() = Some(delay);
   }
}

#[async_trait]
impl RemoteCatalog for MemoryRemote {
   async fn list_page(&self, cursor: Option<&str>) -> Result<CatalogPage, RemoteError> {
      let page_size = self.page_size.load(Ordering::SeqCst).max(1);
      let mut handles: Vec<RemoteHandle> = self.files.lock().values().cloned().collect();
      handles.sort_by(|a, b| a.id.cmp(&b.id));

      let offset: usize = cursor
         .map(|c| c.parse().map_err(|_| RemoteError::Rejected("bad page token".into())))
         .transpose()?
         .unwrap_or(0);

      let page: Vec<RemoteHandle> = handles.iter().skip(offset).take(page_size).cloned().collect();
      let next = offset + page.len();
      let next_cursor = (next < handles.len()).then(|| next.to_string());

      Ok(CatalogPage { handles: page, next_cursor })
   }

   async fn resolve(&self, hash: ContentHash) -> Result<RemoteHandle, RemoteError> {
      self.resolve_calls.fetch_add(1, Ordering::SeqCst);

      if let Some(err) = self.resolve_errors.lock().pop_front() {
         return Err(err);
      }

      self
         .files
         .lock()
         .get(&hash)
         .cloned()
         .ok_or(RemoteError::NotFound)
   }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
   async fn upload(&self, display_name: &str, bytes: &[u8]) -> Result<RemoteHandle, RemoteError> {
      self.upload_attempts.fetch_add(1, Ordering::SeqCst);

      let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

      let delay = *self.upload_delay.lock();
      if let Some(delay) = delay {
         tokio::time::sleep(delay).await;
      }

      let result = if let Some(err) = self.upload_errors.lock().pop_front() {
         Err(err)
      } else {
         let hash = ContentHash::sum(bytes);
         let handle = Self::make_handle(hash, display_name);
         self.files.lock().insert(hash, handle.clone());
         Ok(handle)
      };

      self.in_flight.fetch_sub(1, Ordering::SeqCst);
      result
   }
}
