use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;

use campaign_dispatcher::{
    record_incoming, Campaign, CampaignId, CampaignStatus, CampaignStore, DispatchConfig,
    DispatchEngine, DispatchError, DispatchJob, Direction, EngineConfig, FailureReason,
    Gateway, InMemoryCampaignStore, InMemoryMessageLogStore, IncomingMessage, MediaType,
    MessageId, MessageLogEntry, MessagePayload, MessageStatus, MessageLogStore, NewCampaign,
    Phone, StoreError,
};

/// Scripted gateway: per-phone failure counts, plus in-flight accounting so
/// tests can assert the concurrency bound.
#[derive(Default)]
struct MockGateway {
    fail_counts: StdMutex<HashMap<String, u32>>,
    attempts: StdMutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    hold: Duration,
}

impl MockGateway {
    fn new() -> Self {
        Self::default()
    }

    fn with_hold(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    /// Make the first `times` attempts for `phone` fail.
    fn fail_times(&self, phone: &str, times: u32) {
        self.fail_counts
            .lock()
            .unwrap()
            .insert(phone.to_string(), times);
    }

    fn always_fail(&self, phone: &str) {
        self.fail_times(phone, u32::MAX);
    }

    fn attempts_for(&self, phone: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(phone)
            .copied()
            .unwrap_or(0)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn attempt(&self, to: &Phone) -> Result<(), FailureReason> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let attempt_number = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(to.0.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let budget = self
            .fail_counts
            .lock()
            .unwrap()
            .get(&to.0)
            .copied()
            .unwrap_or(0);

        if attempt_number <= budget {
            Err(FailureReason::Unreachable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn send_text(&self, to: &Phone, _body: &str) -> Result<(), FailureReason> {
        self.attempt(to).await
    }

    async fn send_image(
        &self,
        to: &Phone,
        _media_url: &str,
        _caption: &str,
    ) -> Result<(), FailureReason> {
        self.attempt(to).await
    }

    async fn send_video(
        &self,
        to: &Phone,
        _media_url: &str,
        _caption: &str,
    ) -> Result<(), FailureReason> {
        self.attempt(to).await
    }
}

/// Campaign store wrapper that records every write in order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CampaignWrite {
    Status(CampaignStatus),
    Progress(u32, u32),
    Finalize(CampaignStatus, u32, u32),
}

struct RecordingCampaignStore {
    inner: InMemoryCampaignStore,
    writes: StdMutex<Vec<CampaignWrite>>,
}

impl RecordingCampaignStore {
    fn new() -> Self {
        Self {
            inner: InMemoryCampaignStore::new(),
            writes: StdMutex::new(Vec::new()),
        }
    }

    fn writes(&self) -> Vec<CampaignWrite> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl CampaignStore for RecordingCampaignStore {
    async fn create(&self, new: NewCampaign) -> Result<Campaign, StoreError> {
        self.inner.create(new).await
    }

    async fn get(&self, id: &CampaignId) -> Result<Campaign, StoreError> {
        self.inner.get(id).await
    }

    async fn set_status(
        &self,
        id: &CampaignId,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        self.writes
            .lock()
            .unwrap()
            .push(CampaignWrite::Status(status));
        self.inner.set_status(id, status).await
    }

    async fn update_progress(
        &self,
        id: &CampaignId,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), StoreError> {
        self.writes
            .lock()
            .unwrap()
            .push(CampaignWrite::Progress(sent_count, failed_count));
        self.inner.update_progress(id, sent_count, failed_count).await
    }

    async fn finalize(
        &self,
        id: &CampaignId,
        status: CampaignStatus,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), StoreError> {
        self.writes
            .lock()
            .unwrap()
            .push(CampaignWrite::Finalize(status, sent_count, failed_count));
        self.inner.finalize(id, status, sent_count, failed_count).await
    }
}

/// Log store that counts bulk inserts and can be told to reject them.
struct CountingLogStore {
    inner: InMemoryMessageLogStore,
    bulk_calls: AtomicUsize,
    fail_bulk: bool,
}

impl CountingLogStore {
    fn new() -> Self {
        Self {
            inner: InMemoryMessageLogStore::new(),
            bulk_calls: AtomicUsize::new(0),
            fail_bulk: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail_bulk: true,
            ..Self::new()
        }
    }

    fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageLogStore for CountingLogStore {
    async fn bulk_insert(&self, entries: Vec<MessageLogEntry>) -> Result<usize, StoreError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bulk {
            return Err(StoreError::Backend("log store unavailable".to_string()));
        }
        self.inner.bulk_insert(entries).await
    }

    async fn insert(&self, entry: MessageLogEntry) -> Result<MessageLogEntry, StoreError> {
        self.inner.insert(entry).await
    }

    async fn latest_outgoing(
        &self,
        phone: &Phone,
    ) -> Result<Option<MessageLogEntry>, StoreError> {
        self.inner.latest_outgoing(phone).await
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), StoreError> {
        self.inner.mark_read(id).await
    }
}

fn fast_config(batch_size: usize, concurrency_limit: usize, retry_attempts: u32) -> DispatchConfig {
    DispatchConfig {
        batch_size,
        concurrency_limit,
        per_message_delay: Duration::ZERO,
        retry_attempts,
        retry_backoff: Duration::from_millis(5),
    }
}

fn phones(numbers: &[&str]) -> Vec<Phone> {
    numbers.iter().map(|n| Phone::new(*n)).collect()
}

async fn create_campaign(store: &dyn CampaignStore, total_contacts: u32) -> CampaignId {
    store
        .create(NewCampaign {
            media_type: MediaType::Text,
            message: Some("hello".to_string()),
            media_url: None,
            total_contacts,
        })
        .await
        .expect("create campaign")
        .id
}

struct Harness {
    gateway: Arc<MockGateway>,
    campaigns: Arc<RecordingCampaignStore>,
    logs: Arc<CountingLogStore>,
    engine: DispatchEngine,
}

fn harness(gateway: MockGateway, logs: CountingLogStore) -> Harness {
    let gateway = Arc::new(gateway);
    let campaigns = Arc::new(RecordingCampaignStore::new());
    let logs = Arc::new(logs);

    let engine = DispatchEngine::new(
        EngineConfig {
            queue_size: 4,
            worker_count: 1,
        },
        gateway.clone(),
        campaigns.clone(),
        logs.clone(),
    );

    Harness {
        gateway,
        campaigns,
        logs,
        engine,
    }
}

#[tokio::test]
async fn partial_failure_completes_with_mixed_counters() {
    // Three targets, one retry each; target 2 fails on both of its attempts.
    let gateway = MockGateway::new();
    gateway.fail_times("15550000002", 2);

    let h = harness(gateway, CountingLogStore::new());
    let id = create_campaign(h.campaigns.as_ref(), 3).await;

    let targets = phones(&["15550000001", "15550000002", "15550000003"]);
    let job = DispatchJob::new(id.clone(), targets, MessagePayload::text("hello"))
        .with_config(fast_config(10, 5, 1));

    let summary = h.engine.run(job).await;

    assert_eq!(summary.sent_count, 2);
    assert_eq!(summary.failed_count, 1);

    let campaign = h.campaigns.get(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.sent_count, 2);
    assert_eq!(campaign.failed_count, 1);
    assert_eq!(campaign.sent_count + campaign.failed_count, campaign.total_contacts);

    // The failing target used its full attempt budget.
    assert_eq!(h.gateway.attempts_for("15550000002"), 2);

    // The failure reason text is preserved in the log.
    let entries = h.logs.inner.entries_for_campaign(&id).await;
    let failed: Vec<_> = entries
        .iter()
        .filter(|e| e.status == MessageStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].phone.as_str(), "15550000002");
    assert!(failed[0].error.as_deref().unwrap_or_default().contains("no response"));
}

#[tokio::test]
async fn total_failure_marks_campaign_failed() {
    let gateway = MockGateway::new();
    gateway.always_fail("15550000001");
    gateway.always_fail("15550000002");

    let h = harness(gateway, CountingLogStore::new());
    let id = create_campaign(h.campaigns.as_ref(), 2).await;

    let job = DispatchJob::new(
        id.clone(),
        phones(&["15550000001", "15550000002"]),
        MessagePayload::text("hello"),
    )
    .with_config(fast_config(10, 5, 1));

    let summary = h.engine.run(job).await;

    assert_eq!(summary.sent_count, 0);
    assert_eq!(summary.failed_count, 2);

    let campaign = h.campaigns.get(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Failed);
}

#[tokio::test]
async fn one_success_is_enough_for_completed() {
    let gateway = MockGateway::new();
    gateway.always_fail("15550000002");
    gateway.always_fail("15550000003");

    let h = harness(gateway, CountingLogStore::new());
    let id = create_campaign(h.campaigns.as_ref(), 3).await;

    let job = DispatchJob::new(
        id.clone(),
        phones(&["15550000001", "15550000002", "15550000003"]),
        MessagePayload::text("hello"),
    )
    .with_config(fast_config(10, 5, 0));

    h.engine.run(job).await;

    let campaign = h.campaigns.get(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.sent_count, 1);
    assert_eq!(campaign.failed_count, 2);
}

#[tokio::test]
async fn batches_write_counters_and_logs_once_each() {
    // 25 targets, batch size 10: batches of 10, 10 and 5.
    let numbers: Vec<String> = (0..25).map(|i| format!("1555000{:04}", i)).collect();
    let targets: Vec<Phone> = numbers.iter().map(Phone::new).collect();

    let h = harness(MockGateway::new(), CountingLogStore::new());
    let id = create_campaign(h.campaigns.as_ref(), 25).await;

    let job = DispatchJob::new(id.clone(), targets, MessagePayload::text("hello"))
        .with_config(fast_config(10, 5, 1));

    h.engine.run(job).await;

    assert_eq!(h.logs.bulk_calls(), 3);

    let progress: Vec<(u32, u32)> = h
        .campaigns
        .writes()
        .into_iter()
        .filter_map(|w| match w {
            CampaignWrite::Progress(sent, failed) => Some((sent, failed)),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 3);
    assert_eq!(progress.last(), Some(&(25, 0)));

    // Counter writes never decrease across the campaign's lifetime.
    for pair in progress.windows(2) {
        assert!(pair[1].0 >= pair[0].0);
        assert!(pair[1].1 >= pair[0].1);
    }
}

#[tokio::test]
async fn status_writes_are_ordered_and_forward_only() {
    let h = harness(MockGateway::new(), CountingLogStore::new());
    let id = create_campaign(h.campaigns.as_ref(), 2).await;

    let job = DispatchJob::new(
        id.clone(),
        phones(&["15550000001", "15550000002"]),
        MessagePayload::text("hello"),
    )
    .with_config(fast_config(10, 5, 0));

    h.engine.run(job).await;

    let writes = h.campaigns.writes();
    assert_eq!(
        writes.first(),
        Some(&CampaignWrite::Status(CampaignStatus::Sending))
    );
    assert!(matches!(
        writes.last(),
        Some(CampaignWrite::Finalize(CampaignStatus::Completed, 2, 0))
    ));
}

#[tokio::test]
async fn log_store_failure_does_not_stop_dispatch() {
    let numbers: Vec<String> = (0..6).map(|i| format!("1555000{:04}", i)).collect();
    let targets: Vec<Phone> = numbers.iter().map(Phone::new).collect();

    let h = harness(MockGateway::new(), CountingLogStore::failing());
    let id = create_campaign(h.campaigns.as_ref(), 6).await;

    let job = DispatchJob::new(id.clone(), targets, MessagePayload::text("hello"))
        .with_config(fast_config(2, 2, 0));

    let summary = h.engine.run(job).await;

    // Every batch was attempted despite the log store rejecting each one.
    assert_eq!(h.logs.bulk_calls(), 3);
    assert_eq!(summary.sent_count, 6);

    let campaign = h.campaigns.get(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
}

#[tokio::test]
async fn concurrency_never_exceeds_limit() {
    let numbers: Vec<String> = (0..8).map(|i| format!("1555000{:04}", i)).collect();
    let targets: Vec<Phone> = numbers.iter().map(Phone::new).collect();

    let h = harness(
        MockGateway::with_hold(Duration::from_millis(30)),
        CountingLogStore::new(),
    );
    let id = create_campaign(h.campaigns.as_ref(), 8).await;

    let job = DispatchJob::new(id.clone(), targets, MessagePayload::text("hello"))
        .with_config(fast_config(8, 2, 0));

    h.engine.run(job).await;

    assert!(h.gateway.max_in_flight() <= 2);
    let campaign = h.campaigns.get(&id).await.unwrap();
    assert_eq!(campaign.sent_count, 8);
}

#[tokio::test]
async fn empty_target_list_still_terminates() {
    let h = harness(MockGateway::new(), CountingLogStore::new());
    let id = create_campaign(h.campaigns.as_ref(), 0).await;

    let job = DispatchJob::new(id.clone(), Vec::new(), MessagePayload::text("hello"))
        .with_config(fast_config(10, 5, 1));

    let summary = h.engine.run(job).await;

    assert_eq!(summary.sent_count, 0);
    assert_eq!(summary.failed_count, 0);

    let campaign = h.campaigns.get(&id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(h.logs.bulk_calls(), 0);
}

#[tokio::test]
async fn every_target_gets_exactly_one_log_entry() {
    let numbers: Vec<String> = (0..13).map(|i| format!("1555000{:04}", i)).collect();
    let targets: Vec<Phone> = numbers.iter().map(Phone::new).collect();

    let gateway = MockGateway::new();
    gateway.always_fail("15550000003");
    gateway.always_fail("15550000007");

    let h = harness(gateway, CountingLogStore::new());
    let id = create_campaign(h.campaigns.as_ref(), 13).await;

    let job = DispatchJob::new(id.clone(), targets, MessagePayload::text("hello"))
        .with_config(fast_config(5, 3, 1));

    h.engine.run(job).await;

    let entries = h.logs.inner.entries_for_campaign(&id).await;
    assert_eq!(entries.len(), 13);

    // No duplicates, no omissions: one entry per phone, failures included.
    let mut logged: Vec<&str> = entries.iter().map(|e| e.phone.as_str()).collect();
    logged.sort_unstable();
    logged.dedup();
    assert_eq!(logged.len(), 13);
    assert!(entries.iter().all(|e| e.direction == Direction::Outgoing));
    assert_eq!(
        entries.iter().filter(|e| e.status == MessageStatus::Failed).count(),
        2
    );
}

#[tokio::test]
async fn image_payload_without_media_url_fails_as_rejected() {
    let h = harness(MockGateway::new(), CountingLogStore::new());
    let id = create_campaign(h.campaigns.as_ref(), 1).await;

    let broken = MessagePayload {
        media_type: MediaType::Image,
        message: Some("caption".to_string()),
        media_url: None,
    };

    let job = DispatchJob::new(id.clone(), phones(&["15550000001"]), broken)
        .with_config(fast_config(10, 5, 0));

    h.engine.run(job).await;

    let entries = h.logs.inner.entries_for_campaign(&id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, MessageStatus::Failed);
    assert!(entries[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("rejected"));
}

#[tokio::test]
async fn enqueue_applies_backpressure_and_shutdown_drains() {
    let gateway = Arc::new(MockGateway::with_hold(Duration::from_millis(100)));
    let campaigns = Arc::new(InMemoryCampaignStore::new());
    let logs = Arc::new(InMemoryMessageLogStore::new());

    let mut engine = DispatchEngine::new(
        EngineConfig {
            queue_size: 1,
            worker_count: 1,
        },
        gateway.clone(),
        campaigns.clone(),
        logs.clone(),
    );

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(create_campaign(campaigns.as_ref(), 1).await);
    }

    let job = |id: &CampaignId| {
        DispatchJob::new(id.clone(), phones(&["15550000001"]), MessagePayload::text("hi"))
            .with_config(fast_config(10, 5, 0))
    };

    // First job goes to the worker, second fills the queue of one.
    assert!(engine.enqueue(job(&ids[0])).is_ok());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.enqueue(job(&ids[1])).is_ok());
    assert_eq!(engine.enqueue(job(&ids[2])), Err(DispatchError::Backpressure));

    // Shutdown stops intake but still drains what was accepted.
    engine.shutdown().await;
    assert_eq!(engine.enqueue(job(&ids[2])), Err(DispatchError::Shutdown));

    for id in &ids[..2] {
        let campaign = campaigns.get(id).await.unwrap();
        assert!(campaign.status.is_terminal());
        assert_eq!(campaign.sent_count, 1);
    }
}

#[tokio::test]
async fn incoming_message_is_attributed_to_latest_campaign() {
    let h = harness(MockGateway::new(), CountingLogStore::new());
    let id = create_campaign(h.campaigns.as_ref(), 1).await;

    let job = DispatchJob::new(
        id.clone(),
        phones(&["15550000001"]),
        MessagePayload::text("hello"),
    )
    .with_config(fast_config(10, 5, 0));
    h.engine.run(job).await;

    let entry = record_incoming(
        h.logs.as_ref(),
        IncomingMessage {
            phone: Phone::new("15550000001"),
            media_type: MediaType::Text,
            content: Some("reply".to_string()),
            timestamp: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(entry.campaign_id, Some(id));
    assert_eq!(entry.direction, Direction::Incoming);
    assert_eq!(entry.status, MessageStatus::Delivered);
    assert!(!entry.is_read);

    h.logs.mark_read(&entry.id).await.unwrap();
    let stored = h.logs.inner.entries().await;
    let stored = stored.iter().find(|e| e.id == entry.id).unwrap();
    assert!(stored.is_read);
}

#[tokio::test]
async fn incoming_message_without_history_has_no_campaign() {
    let logs = InMemoryMessageLogStore::new();

    let entry = record_incoming(
        &logs,
        IncomingMessage {
            phone: Phone::new("19990000000"),
            media_type: MediaType::Text,
            content: Some("hello?".to_string()),
            timestamp: None,
        },
    )
    .await
    .unwrap();

    assert_eq!(entry.campaign_id, None);
}
