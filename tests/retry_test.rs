use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use campaign_dispatcher::{send_with_retry, FailureReason};

#[tokio::test]
async fn success_short_circuits_retries() {
    let calls = AtomicU32::new(0);

    let result = send_with_retry(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, FailureReason>(42) }
        },
        3,
        Duration::ZERO,
    )
    .await;

    assert_eq!(result, Ok(42));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_attempts_then_success_within_budget() {
    let calls = AtomicU32::new(0);

    let result = send_with_retry(
        || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(FailureReason::Unreachable)
                } else {
                    Ok(())
                }
            }
        },
        2,
        Duration::ZERO,
    )
    .await;

    assert_eq!(result, Ok(()));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhaustion_surfaces_the_last_failure() {
    let calls = AtomicU32::new(0);

    let result = send_with_retry(
        || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err::<(), _>(FailureReason::Unreachable)
                } else {
                    Err(FailureReason::RemoteError)
                }
            }
        },
        1,
        Duration::ZERO,
    )
    .await;

    // Two attempts total; the second failure wins.
    assert_eq!(result, Err(FailureReason::RemoteError));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_retries_means_one_attempt() {
    let calls = AtomicU32::new(0);

    let result = send_with_retry(
        || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(FailureReason::ClientRejected) }
        },
        0,
        Duration::ZERO,
    )
    .await;

    assert_eq!(result, Err(FailureReason::ClientRejected));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
