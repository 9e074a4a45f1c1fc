//! Remote store capability: catalog reads and upload writes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::ContentHash;

/// Errors surfaced by the remote store and catalog.
///
/// `Unavailable` and `RateLimited` are transient; callers retry with
/// backoff under a bounded attempt count. `Rejected` is a permanent
/// per-document refusal and is never retried.
#[derive(Debug, Error)]
pub enum RemoteError {
   /// Transient network or service failure, including timeouts.
   #[error("remote unavailable: {0}")]
   Unavailable(String),

   /// The remote asked us to slow down.
   #[error("rate limited by remote")]
   RateLimited { retry_after: Option<Duration> },

   /// The remote refused the content (size limit, format, hash mismatch).
   #[error("remote rejected document: {0}")]
   Rejected(String),

   /// No currently-valid handle for the requested content hash.
   #[error("content not found in remote store")]
   NotFound,
}

impl RemoteError {
   /// Whether a retry under backoff can possibly succeed.
   pub const fn is_transient(&self) -> bool {
      matches!(self, Self::Unavailable(_) | Self::RateLimited { .. })
   }
}

/// Opaque reference to a document the remote store holds.
///
/// Valid only as long as the remote store has not expired it; the index
/// must not assume permanent validity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteHandle {
   /// Remote-assigned identifier, e.g. `files/4f2c09a1`.
   pub id:          String,
   /// RFC 3339 timestamp of the upload.
   pub uploaded_at: String,
   /// Content hash the document was uploaded under.
   pub hash:        ContentHash,
   #[serde(default)]
   pub display_name: Option<String>,
}

/// One page of catalog listing results.
#[derive(Debug, Default)]
pub struct CatalogPage {
   pub handles:     Vec<RemoteHandle>,
   /// Cursor for the next page; `None` when the listing is exhausted.
   pub next_cursor: Option<String>,
}

/// Read-only view of what the remote store currently holds.
///
/// Never mutates remote state, and never fabricates a match: a `resolve`
/// success corresponds to a handle the remote currently considers valid.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
   /// Lists one page of known handles, resuming from `cursor`.
   async fn list_page(&self, cursor: Option<&str>) -> Result<CatalogPage, RemoteError>;

   /// Resolves a content hash to a currently-valid handle, or `NotFound`.
   async fn resolve(&self, hash: ContentHash) -> Result<RemoteHandle, RemoteError>;
}

/// Full remote store capability: catalog reads plus uploads.
#[async_trait]
pub trait RemoteStore: RemoteCatalog {
   /// Uploads document bytes; returns the handle the remote assigned.
   async fn upload(&self, display_name: &str, bytes: &[u8]) -> Result<RemoteHandle, RemoteError>;
}

/// Drains the catalog listing into a single vector.
pub async fn list_all(catalog: &dyn RemoteCatalog) -> Result<Vec<RemoteHandle>, RemoteError> {
   let mut handles = Vec::new();
   let mut cursor: Option<String> = None;

   loop {
      let page = catalog.list_page(cursor.as_deref()).await?;
      handles.extend(page.handles);
      match page.next_cursor {
         Some(next) => cursor = Some(next),
         None => return Ok(handles),
      }
   }
}
