//! Retry with exponential back-off and jitter, shared by the fetchers.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries on
//! transient errors (network failures, 5xx, rate limits). Non-transient
//! errors — login failures, malformed responses — are returned immediately.

use std::future::Future;
use std::time::Duration;

use crate::error::FetchError;

/// Hard ceiling on a single back-off sleep.
const MAX_DELAY_MS: u64 = 60_000;

/// Returns `true` for errors that are worth retrying after a back-off delay.
///
/// **Retriable:**
/// - Network-level failures: timeout, connection reset.
/// - HTTP 5xx responses and explicit rate-limit responses.
///
/// **Not retriable (hard stop):**
/// - [`FetchError::Login`] — the run cannot make progress without a session.
/// - [`FetchError::Deserialize`] — malformed response; retrying won't fix it.
/// - [`FetchError::UnexpectedStatus`] — 4xx-class rejection of the request itself.
/// - [`FetchError::Browser`] / [`FetchError::Mapping`] — not transport faults.
pub(crate) fn is_retriable(err: &FetchError) -> bool {
    match err {
        FetchError::Http(e) => {
            e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
        }
        FetchError::RateLimited { .. } => true,
        FetchError::Login { .. }
        | FetchError::Deserialize { .. }
        | FetchError::UnexpectedStatus { .. }
        | FetchError::Browser(_)
        | FetchError::Mapping { .. } => false,
    }
}

/// The pre-jitter back-off delay for a given retry attempt (1-based).
///
/// Doubles per attempt from `base_ms`, capped at [`MAX_DELAY_MS`]. Kept
/// separate from the jitter so the schedule itself stays deterministic.
pub(crate) fn computed_delay_ms(attempt: u32, base_ms: u64) -> u64 {
    base_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(10))
        .min(MAX_DELAY_MS)
}

/// Runs `operation` with up to `max_retries` additional attempts on transient
/// errors.
///
/// Each retry sleeps for the capped exponential delay from
/// [`computed_delay_ms`] scaled by ±25 % random jitter, so simultaneous
/// clients don't retry in lockstep. Non-retriable errors are returned
/// immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;
                let capped = computed_delay_ms(attempt, backoff_base_ms);
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    clippy::cast_precision_loss
                )]
                let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
                tracing::warn!(
                    attempt,
                    max_retries,
                    delay_ms,
                    error = %err,
                    "transient fetch error — retrying after back-off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
