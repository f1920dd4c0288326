use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::gateway::{send_payload, Gateway};
use crate::retry::send_with_retry;
use crate::types::{DispatchConfig, MessageStatus, MessagePayload, Phone};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// The per-target result of a full send-with-retry attempt sequence.
#[derive(Debug, Clone)]
pub struct TargetOutcome {
    pub phone: Phone,
    pub status: MessageStatus,

    /// Final failure text, present only for failed outcomes.
    pub error: Option<String>,
}

impl TargetOutcome {
    fn sent(phone: Phone) -> Self {
        Self {
            phone,
            status: MessageStatus::Sent,
            error: None,
        }
    }

    fn failed(phone: Phone, error: String) -> Self {
        Self {
            phone,
            status: MessageStatus::Failed,
            error: Some(error),
        }
    }
}

/// Deliver one batch with at most `concurrency_limit` sends in flight.
///
/// Every target gets its own attempt sequence: the pacing delay, then up to
/// `retry_attempts + 1` gateway calls. One target's permanent failure never
/// cancels sibling in-flight attempts, and the returned outcomes always
/// number exactly one per input target. Completion order between targets is
/// not significant; per-target identity is preserved in the outcomes.
pub async fn run_batch(
    batch: &[Phone],
    payload: &MessagePayload,
    gateway: Arc<dyn Gateway>,
    config: &DispatchConfig,
) -> Vec<TargetOutcome> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency_limit.max(1)));
    let mut handles: Vec<JoinHandle<TargetOutcome>> = Vec::with_capacity(batch.len());

    for phone in batch {
        let phone = phone.clone();
        let payload = payload.clone();
        let gateway = gateway.clone();
        let semaphore = semaphore.clone();
        let delay = config.per_message_delay;
        let retries = config.retry_attempts;
        let backoff = config.retry_backoff;

        handles.push(tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    return TargetOutcome::failed(phone, "batch runner stopped".to_string());
                }
            };

            // Pacing applies inside the permit so the in-flight bound covers
            // the whole attempt sequence, not just the gateway call.
            if !delay.is_zero() {
                sleep(delay).await;
            }

            let gw = gateway.as_ref();
            let result =
                send_with_retry(|| send_payload(gw, &phone, &payload), retries, backoff).await;

            drop(permit);

            match result {
                Ok(()) => {
                    metric_inc("campaign.send.sent");
                    TargetOutcome::sent(phone)
                }
                Err(reason) => {
                    metric_inc("campaign.send.failed");
                    TargetOutcome::failed(phone, reason.to_string())
                }
            }
        }));
    }

    let mut outcomes = Vec::with_capacity(batch.len());
    for (phone, handle) in batch.iter().zip(handles) {
        match handle.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(join_error) => {
                // A panicked send task still owes the batch an outcome.
                tracing::error!(phone = %phone.0, error = %join_error, "send task panicked");
                outcomes.push(TargetOutcome::failed(
                    phone.clone(),
                    "send task panicked".to_string(),
                ));
            }
        }
    }

    outcomes
}
