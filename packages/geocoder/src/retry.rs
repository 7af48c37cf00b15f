//! Retry helpers for transient geocoding failures.
//!
//! Provider calls go through [`with_retries`] so that timeouts, connection
//! resets, rate limiting and server errors are retried a bounded number of
//! times with a fixed pause. Permanent failures (no match, 4xx, bad
//! credentials) are returned immediately.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::GeocodeError;

/// Bounded retry policy for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Values below 1 are
    /// treated as 1.
    pub max_attempts: u32,
    /// Fixed pause between attempts in milliseconds.
    pub backoff_ms: u64,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const NONE: Self = Self {
        max_attempts: 1,
        backoff_ms: 0,
    };

    /// Pause between attempts.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

/// Runs `op` until it succeeds, fails permanently, or the policy's attempt
/// budget is spent.
///
/// `op` is called once per attempt to build a fresh request future.
///
/// # Errors
///
/// Returns the last error from `op`.
pub async fn with_retries<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, GeocodeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GeocodeError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < max_attempts => {
                log::warn!(
                    "  transient error (attempt {attempt}/{max_attempts}), retrying in {:?}: {e}",
                    policy.backoff()
                );
                tokio::time::sleep(policy.backoff()).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Returns `true` if the error is likely transient and worth retrying.
#[must_use]
pub fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
