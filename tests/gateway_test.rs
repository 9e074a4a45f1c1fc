mod support;

use std::{
   sync::{Arc, atomic::Ordering},
   time::Duration,
};

use docsync::{
   fingerprint::Fingerprint,
   gateway::{GatewayLimits, RetryPolicy, UploadGateway},
   remote::{self, RemoteCatalog, RemoteError},
};
use support::MemoryRemote;

fn limits(max_in_flight: usize) -> GatewayLimits {
   GatewayLimits {
      max_in_flight,
      max_per_interval: 64,
      interval: Duration::from_millis(50),
      rate_limit_policy: RetryPolicy::new(4, Duration::from_millis(1), 2),
      unavailable_attempts: 2,
   }
}

#[tokio::test]
async fn success_on_first_attempt() {
   let remote = Arc::new(MemoryRemote::new());
   let gateway = UploadGateway::new(Arc::clone(&remote), limits(4));

   let bytes = b"%PDF-1.7 body";
   let handle = gateway
      .upload("a.pdf", bytes, Fingerprint::compute(bytes))
      .await
      .expect("upload");

   assert_eq!(handle.hash, Fingerprint::compute(bytes).hash);
   assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rate_limited_retries_up_to_bound() {
   let remote = Arc::new(MemoryRemote::new());
   for _ in 0..8 {
      remote.fail_next_upload(RemoteError::RateLimited { retry_after: None });
   }
   let gateway = UploadGateway::new(Arc::clone(&remote), limits(4));

   let bytes = b"%PDF-1.7 body";
   let err = gateway
      .upload("a.pdf", bytes, Fingerprint::compute(bytes))
      .await
      .expect_err("should exhaust");

   assert!(matches!(err, RemoteError::RateLimited { .. }));
   assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn retry_after_hint_is_respected() {
   let remote = Arc::new(MemoryRemote::new());
   remote.fail_next_upload(RemoteError::RateLimited {
      retry_after: Some(Duration::from_millis(20)),
   });
   let gateway = UploadGateway::new(Arc::clone(&remote), limits(4));

   let bytes = b"%PDF-1.7 body";
   let started = std::time::Instant::now();
   gateway
      .upload("a.pdf", bytes, Fingerprint::compute(bytes))
      .await
      .expect("upload");

   assert!(started.elapsed() >= Duration::from_millis(20));
   assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unavailable_uses_short_fixed_budget() {
   let remote = Arc::new(MemoryRemote::new());
   remote.fail_next_upload(RemoteError::Unavailable("down".into()));
   let gateway = UploadGateway::new(Arc::clone(&remote), limits(4));

   let bytes = b"%PDF-1.7 body";
   gateway
      .upload("a.pdf", bytes, Fingerprint::compute(bytes))
      .await
      .expect("second attempt succeeds");
   assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejected_is_never_retried() {
   let remote = Arc::new(MemoryRemote::new());
   remote.fail_next_upload(RemoteError::Rejected("too large".into()));
   let gateway = UploadGateway::new(Arc::clone(&remote), limits(4));

   let bytes = b"%PDF-1.7 body";
   let err = gateway
      .upload("a.pdf", bytes, Fingerprint::compute(bytes))
      .await
      .expect_err("rejected");

   assert!(matches!(err, RemoteError::Rejected(_)));
   assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mismatched_acknowledgement_is_rejected() {
   let remote = Arc::new(MemoryRemote::new());
   let gateway = UploadGateway::new(Arc::clone(&remote), limits(4));

   // Claim a different fingerprint than the bytes actually carry.
   let err = gateway
      .upload("a.pdf", b"%PDF-1.7 body", Fingerprint::compute(b"other"))
      .await
      .expect_err("mismatch");

   assert!(matches!(err, RemoteError::Rejected(_)));
   assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn in_flight_uploads_bounded() {
   let remote = Arc::new(MemoryRemote::new());
   remote.set_upload_delay(Duration::from_millis(20));
   let gateway = Arc::new(UploadGateway::new(Arc::clone(&remote), limits(2)));

   let mut tasks = tokio::task::JoinSet::new();
   for i in 0..6 {
      let gateway = Arc::clone(&gateway);
      tasks.spawn(async move {
         let bytes = format!("%PDF-1.7 body {i}").into_bytes();
         let fingerprint = Fingerprint::compute(&bytes);
         gateway.upload(&format!("{i}.pdf"), &bytes, fingerprint).await
      });
   }
   while let Some(result) = tasks.join_next().await {
      result.expect("join").expect("upload");
   }

   assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 6);
   assert!(remote.peak_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn catalog_listing_resumes_across_pages() {
   let remote = MemoryRemote::new();
   for i in 0..5 {
      remote.insert(format!("%PDF-1.7 doc {i}").as_bytes(), &format!("{i}.pdf"));
   }

   // The double pages two handles at a time; the consumer resumes from the
   // returned cursor until exhaustion.
   let first = remote.list_page(None).await.expect("first page");
   assert_eq!(first.handles.len(), 2);
   assert!(first.next_cursor.is_some());

   let all = remote::list_all(&remote as &dyn RemoteCatalog)
      .await
      .expect("full listing");
   assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn per_interval_budget_paces_dispatch() {
   let remote = Arc::new(MemoryRemote::new());
   let gateway = Arc::new(UploadGateway::new(
      Arc::clone(&remote),
      GatewayLimits {
         max_in_flight: 8,
         max_per_interval: 2,
         interval: Duration::from_millis(40),
         rate_limit_policy: RetryPolicy::new(4, Duration::from_millis(1), 2),
         unavailable_attempts: 2,
      },
   ));

   let started = std::time::Instant::now();
   let mut tasks = tokio::task::JoinSet::new();
   for i in 0..4 {
      let gateway = Arc::clone(&gateway);
      tasks.spawn(async move {
         let bytes = format!("%PDF-1.7 body {i}").into_bytes();
         let fingerprint = Fingerprint::compute(&bytes);
         gateway.upload(&format!("{i}.pdf"), &bytes, fingerprint).await
      });
   }
   while let Some(result) = tasks.join_next().await {
      result.expect("join").expect("upload");
   }

   // Four dispatches at two per 40ms window cannot finish inside the
   // first window.
   assert!(started.elapsed() >= Duration::from_millis(40));
   assert_eq!(remote.upload_attempts.load(Ordering::SeqCst), 4);
}
