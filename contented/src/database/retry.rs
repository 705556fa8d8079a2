//! Retry helpers for store operations.

use std::future::Future;
use std::time::Duration;

use rand::random;
use tokio::time::sleep;
use tracing::debug;

use crate::Result;

const STORE_MAX_RETRIES: usize = 5;
const STORE_BASE_DELAY_MS: u64 = 10;
const STORE_MAX_DELAY_MS: u64 = 500;

/// Run `op` again with capped exponential backoff while it fails with a
/// transient store error. Conflicts and other errors are returned at once.
pub async fn retry_transient<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= STORE_MAX_RETRIES {
                    return Err(err);
                }

                let capped_ms = STORE_BASE_DELAY_MS
                    .saturating_mul(1u64 << attempt)
                    .min(STORE_MAX_DELAY_MS);
                let jitter_ms = random::<u64>() % (capped_ms / 4 + 1);
                let delay = Duration::from_millis(capped_ms + jitter_ms);

                debug!(
                    "Store error during {}: {}; retrying in {:?} (attempt {}/{})",
                    op_name,
                    err,
                    delay,
                    attempt + 1,
                    STORE_MAX_RETRIES
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
