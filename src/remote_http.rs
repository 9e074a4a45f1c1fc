//! HTTP adapter for the remote document store's files API.
//!
//! Speaks a minimal REST surface: `POST /v1/files` to upload,
//! `GET /v1/files` to list (page-token pagination), and
//! `GET /v1/files/lookup` to resolve a content hash. Status codes map onto
//! the [`RemoteError`] taxonomy; timeouts are `Unavailable`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::{
   Result,
   config::Config,
   fingerprint::ContentHash,
   remote::{CatalogPage, RemoteCatalog, RemoteError, RemoteHandle, RemoteStore},
};

/// Wire representation of one stored file.
#[derive(Debug, Deserialize)]
struct FileRecord {
   id:           String,
   created_at:   String,
   sha256:       String,
   #[serde(default)]
   display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
   #[serde(default)]
   files:           Vec<FileRecord>,
   #[serde(default)]
   next_page_token: Option<String>,
}

impl FileRecord {
   fn into_handle(self) -> Result<RemoteHandle, RemoteError> {
      let hash = ContentHash::from_hex(&self.sha256)
         .ok_or_else(|| RemoteError::Rejected(format!("malformed sha256 '{}'", self.sha256)))?;
      Ok(RemoteHandle {
         id: self.id,
         uploaded_at: self.created_at,
         hash,
         display_name: self.display_name,
      })
   }
}

/// Remote store client over HTTP.
pub struct HttpRemote {
   client:    reqwest::Client,
   base_url:  String,
   api_key:   String,
   page_size: usize,
}

impl HttpRemote {
   /// Builds a client from configuration. Fails fast when the API key
   /// environment variable is unset, before any pass starts.
   pub fn from_config(cfg: &Config) -> Result<Self> {
      let api_key = cfg.api_key()?;
      let client = reqwest::Client::builder()
         .timeout(Duration::from_millis(cfg.remote_timeout_ms))
         .build()
         .map_err(|e| RemoteError::Unavailable(format!("client init: {e}")))?;

      Ok(Self {
         client,
         base_url: cfg.remote_base_url.trim_end_matches('/').to_string(),
         api_key,
         page_size: cfg.remote_page_size.max(1),
      })
   }

   fn url(&self, path: &str) -> String {
      format!("{}{path}", self.base_url)
   }
}

fn transport_error(e: &reqwest::Error) -> RemoteError {
   if e.is_timeout() {
      RemoteError::Unavailable("request timed out".to_string())
   } else {
      RemoteError::Unavailable(e.to_string())
   }
}

/// Translates a non-success status into a [`RemoteError`].
///
/// 429 carries an optional Retry-After; 5xx and 408 are transient; any
/// other client error is a permanent per-request refusal.
fn status_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> RemoteError {
   match status {
      StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited { retry_after },
      StatusCode::NOT_FOUND => RemoteError::NotFound,
      StatusCode::REQUEST_TIMEOUT => RemoteError::Unavailable("http 408".to_string()),
      s if s.is_server_error() => RemoteError::Unavailable(format!("http {s}")),
      s => RemoteError::Rejected(format!("http {s}: {body}")),
   }
}

fn parse_retry_after(resp: &reqwest::Response) -> Option<Duration> {
   resp
      .headers()
      .get(reqwest::header::RETRY_AFTER)?
      .to_str()
      .ok()?
      .trim()
      .parse::<u64>()
      .ok()
      .map(Duration::from_secs)
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
   let status = resp.status();
   if status.is_success() {
      return Ok(resp);
   }
   let retry_after = parse_retry_after(&resp);
   let body = resp.text().await.unwrap_or_default();
   Err(status_error(status, retry_after, &body))
}

#[async_trait]
impl RemoteCatalog for HttpRemote {
   async fn list_page(&self, cursor: Option<&str>) -> Result<CatalogPage, RemoteError> {
      let mut req = self
         .client
         .get(self.url("/v1/files"))
         .bearer_auth(&self.api_key)
         .query(&[("page_size", self.page_size.to_string())]);
      if let Some(cursor) = cursor {
         req = req.query(&[("page_token", cursor)]);
      }

      let resp = req.send().await.map_err(|e| transport_error(&e))?;
      let resp = check(resp).await?;
      let list: FileListResponse = resp
         .json()
         .await
         .map_err(|e| RemoteError::Unavailable(format!("malformed listing: {e}")))?;

      let mut handles = Vec::with_capacity(list.files.len());
      for record in list.files {
         handles.push(record.into_handle()?);
      }

      Ok(CatalogPage { handles, next_cursor: list.next_page_token })
   }

   async fn resolve(&self, hash: ContentHash) -> Result<RemoteHandle, RemoteError> {
      let resp = self
         .client
         .get(self.url("/v1/files/lookup"))
         .bearer_auth(&self.api_key)
         .query(&[("sha256", hash.to_string())])
         .send()
         .await
         .map_err(|e| transport_error(&e))?;

      let resp = check(resp).await?;
      let record: FileRecord = resp
         .json()
         .await
         .map_err(|e| RemoteError::Unavailable(format!("malformed lookup response: {e}")))?;
      record.into_handle()
   }
}

#[async_trait]
impl RemoteStore for HttpRemote {
   async fn upload(&self, display_name: &str, bytes: &[u8]) -> Result<RemoteHandle, RemoteError> {
      let hash = ContentHash::sum(bytes);
      let resp = self
         .client
         .post(self.url("/v1/files"))
         .bearer_auth(&self.api_key)
         .header(reqwest::header::CONTENT_TYPE, "application/pdf")
         .header("x-content-sha256", hash.to_string())
         .query(&[("display_name", display_name)])
         .body(bytes.to_vec())
         .send()
         .await
         .map_err(|e| transport_error(&e))?;

      let resp = check(resp).await?;
      let record: FileRecord = resp
         .json()
         .await
         .map_err(|e| RemoteError::Unavailable(format!("malformed upload response: {e}")))?;
      record.into_handle()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn status_mapping() {
      assert!(matches!(
         status_error(StatusCode::TOO_MANY_REQUESTS, None, ""),
         RemoteError::RateLimited { retry_after: None }
      ));
      assert!(matches!(
         status_error(StatusCode::NOT_FOUND, None, ""),
         RemoteError::NotFound
      ));
      assert!(matches!(
         status_error(StatusCode::BAD_GATEWAY, None, ""),
         RemoteError::Unavailable(_)
      ));
      assert!(matches!(
         status_error(StatusCode::PAYLOAD_TOO_LARGE, None, "too big"),
         RemoteError::Rejected(_)
      ));
   }

   #[test]
   fn retry_after_propagated() {
      let err = status_error(
         StatusCode::TOO_MANY_REQUESTS,
         Some(Duration::from_secs(7)),
         "",
      );
      match err {
         RemoteError::RateLimited { retry_after } => {
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
         },
         other => panic!("unexpected error: {other:?}"),
      }
   }
}
