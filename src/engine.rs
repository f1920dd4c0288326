use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::DispatchError;
use crate::gateway::Gateway;
use crate::runner::run_batch;
use crate::store::{CampaignStore, MessageLogStore};
use crate::types::{
    CampaignStatus, DispatchJob, DispatchSummary, MessageLogEntry, MessageStatus,
};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Engine-level tuning: the job queue and its consumers. Per-campaign
/// tuning travels with each [`DispatchJob`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded job queue capacity. A full queue surfaces as
    /// [`DispatchError::Backpressure`] instead of silently dropping work.
    pub queue_size: usize,

    /// Number of campaigns dispatched concurrently.
    pub worker_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            queue_size: 100,
            worker_count,
        }
    }
}

/// Shared, read-only context for campaign workers.
struct EngineContext {
    gateway: Arc<dyn Gateway>,
    campaigns: Arc<dyn CampaignStore>,
    logs: Arc<dyn MessageLogStore>,
}

/// Owns the campaign lifecycle: accepts jobs on a bounded queue, drives the
/// batch runner per campaign, aggregates counters, persists logs in bulk
/// and reconciles the final status.
///
/// Target-level failures are absorbed and converted into log entries and
/// counters; once accepted, a job always reaches a terminal campaign
/// status.
pub struct DispatchEngine {
    job_tx: Option<mpsc::Sender<DispatchJob>>,
    is_running: Arc<AtomicBool>,
    worker_handles: Vec<JoinHandle<()>>,
    ctx: Arc<EngineContext>,
}

impl DispatchEngine {
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn Gateway>,
        campaigns: Arc<dyn CampaignStore>,
        logs: Arc<dyn MessageLogStore>,
    ) -> Self {
        let ctx = Arc::new(EngineContext {
            gateway,
            campaigns,
            logs,
        });

        let (job_tx, job_rx) = mpsc::channel(config.queue_size.max(1));
        let shared_job_rx = Arc::new(Mutex::new(job_rx));

        let mut worker_handles = Vec::new();
        for _ in 0..config.worker_count.max(1) {
            worker_handles.push(tokio::spawn(worker_loop(
                shared_job_rx.clone(),
                ctx.clone(),
            )));
        }

        Self {
            job_tx: Some(job_tx),
            is_running: Arc::new(AtomicBool::new(true)),
            worker_handles,
            ctx,
        }
    }

    /// Hand a campaign to the worker pool without waiting for delivery.
    ///
    /// Failures to *start* dispatch are observable here: a full queue is
    /// `Backpressure` (retryable by the caller), a stopped engine is
    /// `Shutdown`.
    pub fn enqueue(&self, job: DispatchJob) -> Result<(), DispatchError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(DispatchError::Shutdown);
        }

        let Some(job_tx) = self.job_tx.as_ref() else {
            return Err(DispatchError::Shutdown);
        };

        match job_tx.try_send(job) {
            Ok(()) => {
                metric_inc("campaign.dispatch.enqueued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                metric_inc("campaign.dispatch.backpressure");
                Err(DispatchError::Backpressure)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DispatchError::Shutdown),
        }
    }

    /// Dispatch one campaign to completion on the caller's task.
    ///
    /// This is the synchronous core that queue workers run; it returns only
    /// once the campaign reaches a terminal status. Callers wanting
    /// fire-and-forget semantics use [`enqueue`](DispatchEngine::enqueue).
    pub async fn run(&self, job: DispatchJob) -> DispatchSummary {
        run_campaign(&self.ctx, job).await
    }

    /// Stop accepting jobs and wait for in-flight campaigns to finish.
    /// Jobs already queued are still dispatched before workers exit.
    pub async fn shutdown(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.job_tx.take();

        for handle in self.worker_handles.drain(..) {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Main worker loop: pull jobs from the shared queue until it closes.
async fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<DispatchJob>>>, ctx: Arc<EngineContext>) {
    loop {
        let job = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };

        let Some(job) = job else { break };

        let campaign_id = job.campaign_id.clone();
        let summary = run_campaign(&ctx, job).await;
        tracing::info!(
            campaign = %campaign_id.0,
            sent = summary.sent_count,
            failed = summary.failed_count,
            "bulk send completed"
        );
    }
}

/// Drive one campaign from `sending` to its terminal status.
///
/// Store failures along the way are logged and absorbed: the engine carries
/// cumulative totals, so every counter write is absolute and a later write
/// repairs a missed one. Log persistence is a best-effort side channel.
async fn run_campaign(ctx: &EngineContext, job: DispatchJob) -> DispatchSummary {
    let DispatchJob {
        campaign_id,
        targets,
        payload,
        config,
    } = job;

    tracing::info!(
        campaign = %campaign_id.0,
        contacts = targets.len(),
        "starting bulk send"
    );

    // The sending transition happens before any send attempt.
    if let Err(error) = ctx
        .campaigns
        .set_status(&campaign_id, CampaignStatus::Sending)
        .await
    {
        tracing::warn!(campaign = %campaign_id.0, %error, "failed to mark campaign as sending");
    }

    let mut sent_count: u32 = 0;
    let mut failed_count: u32 = 0;
    let batch_size = config.batch_size.max(1);

    for batch in targets.chunks(batch_size) {
        let outcomes = run_batch(batch, &payload, ctx.gateway.clone(), &config).await;

        let mut entries = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome.status {
                MessageStatus::Sent => sent_count += 1,
                _ => failed_count += 1,
            }

            entries.push(MessageLogEntry::outgoing(
                campaign_id.clone(),
                outcome.phone,
                payload.media_type,
                payload.message.clone(),
                outcome.status,
                outcome.error,
            ));
        }

        // One bulk write per batch; failures here never stop the campaign.
        if let Err(error) = ctx.logs.bulk_insert(entries).await {
            metric_inc("campaign.log.insert_failed");
            tracing::warn!(campaign = %campaign_id.0, %error, "failed to persist message log batch");
        }

        // One counter write per batch, cumulative totals.
        if let Err(error) = ctx
            .campaigns
            .update_progress(&campaign_id, sent_count, failed_count)
            .await
        {
            tracing::warn!(campaign = %campaign_id.0, %error, "failed to update campaign progress");
        }

        tracing::debug!(
            campaign = %campaign_id.0,
            sent = sent_count,
            failed = failed_count,
            total = targets.len(),
            "batch completed"
        );
    }

    let total = targets.len() as u32;
    let final_status = if total > 0 && failed_count == total {
        CampaignStatus::Failed
    } else {
        CampaignStatus::Completed
    };

    if let Err(error) = ctx
        .campaigns
        .finalize(&campaign_id, final_status, sent_count, failed_count)
        .await
    {
        tracing::error!(campaign = %campaign_id.0, %error, "failed to finalize campaign");
    }

    DispatchSummary {
        sent_count,
        failed_count,
    }
}
