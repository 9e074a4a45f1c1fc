//! Upload dispatch with local rate limiting and bounded retries.
//!
//! The gateway enforces its own in-flight and per-interval limits,
//! independent of whatever the remote imposes, so that `RateLimited`
//! responses are avoided rather than merely reacted to.

use std::{
   collections::VecDeque,
   sync::Arc,
   time::Duration,
};

use parking_lot::Mutex;
use tokio::{
   sync::Semaphore,
   time::{Instant, sleep},
};

use crate::{
   config::Config,
   fingerprint::Fingerprint,
   remote::{RemoteError, RemoteHandle, RemoteStore},
};

/// Bounded-attempt backoff policy: attempt `n` waits
/// `base_delay * multiplier^(n-1)` before retrying.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
   pub max_attempts: u32,
   pub base_delay:   Duration,
   pub multiplier:   u32,
}

impl RetryPolicy {
   pub fn new(max_attempts: u32, base_delay: Duration, multiplier: u32) -> Self {
      Self {
         max_attempts: max_attempts.max(1),
         base_delay,
         multiplier: multiplier.max(1),
      }
   }

   /// Delay before retrying after failed attempt `attempt` (1-based).
   pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
      let exponent = attempt.saturating_sub(1).min(16);
      let factor = u64::from(self.multiplier).saturating_pow(exponent);
      let millis = (self.base_delay.as_millis() as u64).saturating_mul(factor);
      Duration::from_millis(millis)
   }
}

/// Knobs for one gateway instance.
#[derive(Debug, Clone)]
pub struct GatewayLimits {
   pub max_in_flight:        usize,
   pub max_per_interval:     usize,
   pub interval:             Duration,
   pub rate_limit_policy:    RetryPolicy,
   pub unavailable_attempts: u32,
}

impl GatewayLimits {
   pub fn from_config(cfg: &Config) -> Self {
      Self {
         max_in_flight: cfg.effective_upload_workers(),
         max_per_interval: cfg.effective_max_uploads_per_interval(),
         interval: Duration::from_millis(cfg.upload_interval_ms),
         rate_limit_policy: RetryPolicy::new(
            cfg.rate_limit_max_attempts,
            Duration::from_millis(cfg.retry_base_delay_ms),
            cfg.retry_multiplier,
         ),
         unavailable_attempts: cfg.unavailable_max_attempts.max(1),
      }
   }
}

/// Performs uploads decided by the reconciliation pass.
pub struct UploadGateway<R: RemoteStore> {
   remote:   Arc<R>,
   limits:   GatewayLimits,
   inflight: Semaphore,
   window:   Mutex<VecDeque<Instant>>,
}

impl<R: RemoteStore> UploadGateway<R> {
   pub fn new(remote: Arc<R>, limits: GatewayLimits) -> Self {
      let permits = limits.max_in_flight.max(1);
      Self {
         remote,
         limits,
         inflight: Semaphore::new(permits),
         window: Mutex::new(VecDeque::new()),
      }
   }

   /// Uploads one document, retrying transient failures under the
   /// configured bounds.
   ///
   /// On success the returned handle is verified against the expected
   /// fingerprint; an acknowledgement for different content is a
   /// `Rejected`-class anomaly, never silently accepted.
   pub async fn upload(
      &self,
      display_name: &str,
      bytes: &[u8],
      fingerprint: Fingerprint,
   ) -> Result<RemoteHandle, RemoteError> {
      // Dropping the permit at the end of the call releases the in-flight
      // slot even on failure paths.
      let _permit = self
         .inflight
         .acquire()
         .await
         .map_err(|_| RemoteError::Unavailable("gateway closed".to_string()))?;

      let mut rate_limited_attempts = 0u32;
      let mut unavailable_attempts = 0u32;

      loop {
         self.throttle().await;

         match self.remote.upload(display_name, bytes).await {
            Ok(handle) => {
               if handle.hash != fingerprint.hash {
                  return Err(RemoteError::Rejected(format!(
                     "remote acknowledged content hash {} but {} was uploaded",
                     handle.hash, fingerprint.hash
                  )));
               }
               return Ok(handle);
            },
            Err(RemoteError::RateLimited { retry_after }) => {
               rate_limited_attempts += 1;
               if rate_limited_attempts >= self.limits.rate_limit_policy.max_attempts {
                  return Err(RemoteError::RateLimited { retry_after });
               }
               let delay = self
                  .limits
                  .rate_limit_policy
                  .delay_for_attempt(rate_limited_attempts);
               let delay = retry_after.map_or(delay, |ra| ra.max(delay));
               tracing::debug!(
                  "rate limited uploading {display_name}, retrying in {}ms",
                  delay.as_millis()
               );
               sleep(delay).await;
            },
            Err(RemoteError::Unavailable(reason)) => {
               unavailable_attempts += 1;
               if unavailable_attempts >= self.limits.unavailable_attempts {
                  return Err(RemoteError::Unavailable(reason));
               }
               let delay = self
                  .limits
                  .rate_limit_policy
                  .delay_for_attempt(unavailable_attempts);
               tracing::debug!(
                  "remote unavailable uploading {display_name} ({reason}), retrying in {}ms",
                  delay.as_millis()
               );
               sleep(delay).await;
            },
            Err(err) => return Err(err),
         }
      }
   }

   /// Blocks until dispatching one more upload stays within the
   /// per-interval budget.
   async fn throttle(&self) {
      loop {
         let wait = {
            let mut window = self.window.lock();
            let now = Instant::now();
            loop {
               match window.front() {
                  Some(front) if now.duration_since(*front) >= self.limits.interval => {
                     window.pop_front();
                  },
                  _ => break,
               }
            }
            if window.len() < self.limits.max_per_interval {
               window.push_back(now);
               None
            } else {
               // Sleep until the oldest dispatch ages out of the window.
               window
                  .front()
                  .map(|front| self.limits.interval.saturating_sub(now.duration_since(*front)))
            }
         };

         match wait {
            None => return,
            Some(wait) => sleep(wait.max(Duration::from_millis(1))).await,
         }
      }
   }
}
