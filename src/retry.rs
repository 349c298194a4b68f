//! Optional retry scaffold for transient transport failures.
//!
//! Default is zero retries: a failed request is reported once against its
//! item and the user re-runs the sync, which is a safe no-op for items that
//! already succeeded. Operators can opt in to backoff via `--max-retries`.

use std::future::Future;

use rand::Rng as _;

/// Exponential backoff configuration with jitter so concurrent downloads
/// hitting the same transient failure do not retry in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_secs: 5,
            max_delay_secs: 60,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-indexed): the base delay
    /// doubled per retry, capped at `max_delay_secs`, plus up to one base
    /// delay of jitter.
    pub fn delay_for_retry(&self, retry: u32) -> std::time::Duration {
        let doubled = self
            .base_delay_secs
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX))
            .min(self.max_delay_secs);
        let jitter = match self.base_delay_secs {
            0 => 0,
            base => rand::thread_rng().gen_range(0..base),
        };
        std::time::Duration::from_secs(doubled + jitter)
    }
}

/// Run `operation` up to `max_retries + 1` times, sleeping between
/// attempts. `is_retryable` gates each retry; an error it rejects is
/// returned as-is, and the final attempt's error is returned on
/// exhaustion.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    is_retryable: C,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => e,
        };
        attempt += 1;
        if !is_retryable(&err) || attempt > config.max_retries {
            return Err(err);
        }
        let delay = config.delay_for_retry(attempt - 1);
        tracing::warn!(
            "Attempt {}/{} failed, next in {}s: {}",
            attempt,
            config.max_retries + 1,
            delay.as_secs(),
            err
        );
        tokio::time::sleep(delay).await;
    }
}
