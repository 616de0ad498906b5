use crate::ServerError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry an async server call while it fails with a transient error.
///
/// Calls `f` up to `max_attempts` times, waiting `500ms * attempt` between
/// tries. Non-transient errors are returned immediately.
pub async fn retry_transient<F, Fut, T>(max_attempts: u32, label: &str, f: F) -> Result<T, ServerError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ServerError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(
                    operation = "server_retry",
                    attempt,
                    max_attempts,
                    error = %e,
                    "{} failed, retrying", label
                );
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    warn!(operation = "server_retry_exhausted", max_attempts, "{} failed after {} attempts", label, max_attempts);
                }
                return Err(e);
            }
        }
    }
}
