use std::future::Future;
use std::time::Duration;

use coursegen_types::ErrorKindExt;
use tracing::warn;

use crate::error::StoreError;

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 10_000;
const MAX_ATTEMPTS: u32 = 5;

/// Retries `f` with capped exponential backoff (base 1s, cap 10s, up to 5
/// attempts) when the error it returns classifies as `NET_TRANSIENT`.
/// Any other error kind is surfaced immediately.
pub async fn with_retry<F, Fut, T>(operation: &'static str, mut f: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < MAX_ATTEMPTS && err.kind().is_locally_retryable() => {
                let delay = BASE_DELAY_MS.saturating_mul(1u64 << (attempt - 1)).min(MAX_DELAY_MS);
                warn!(operation, attempt, delay_ms = delay, "retrying transient store error");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(err) if attempt >= MAX_ATTEMPTS && err.kind().is_locally_retryable() => {
                return Err(StoreError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        }
    }
}
