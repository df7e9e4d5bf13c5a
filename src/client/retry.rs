//! Backoff for read-only daemon calls
//!
//! A busy daemon answers UNAVAILABLE while it is still syncing or saving the
//! wallet. Bot loops wrap their idempotent reads in [`with_retry`] so one busy
//! reply does not end the bot. Errors `ApiError::is_retryable` rejects are
//! returned on the first failure.

use crate::error::ApiError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Calls made after the first one fails
    pub retries: u32,
    pub first_delay: Duration,
    /// The doubling delay stops growing here
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            first_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Calls `call` until it succeeds, fails with a non-retryable error, or the
/// policy's retries run out.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, method: &str, mut call: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut delay = policy.first_delay;
    let mut retries_left = policy.retries;

    loop {
        let err = match call().await {
            Ok(reply) => return Ok(reply),
            Err(err) => err,
        };
        if !err.is_retryable() {
            return Err(err);
        }
        if retries_left == 0 {
            warn!("{} still failing after {} retries: {}", method, policy.retries, err);
            return Err(err);
        }
        retries_left -= 1;

        debug!("{} failed ({}), calling again in {:?}", method, err, delay);
        sleep(delay).await;
        delay = (delay * 2).min(policy.max_delay);
    }
}
