use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::FailureReason;

/// Run `attempt` up to `max_retries + 1` times with a fixed backoff wait
/// between attempts.
///
/// The first success short-circuits remaining retries. When every attempt
/// fails, the *last* failure is the one returned.
pub async fn send_with_retry<F, Fut, T>(
    mut attempt: F,
    max_retries: u32,
    backoff: Duration,
) -> Result<T, FailureReason>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FailureReason>>,
{
    let mut last_error = FailureReason::Unreachable;

    for round in 0..=max_retries {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(reason) => {
                last_error = reason;
                if round < max_retries {
                    tracing::warn!(
                        attempt = round + 1,
                        error = %last_error,
                        "send attempt failed, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }

    Err(last_error)
}
