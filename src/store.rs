use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::types::{
    Campaign, CampaignId, CampaignStatus, MessageId, MessageLogEntry, NewCampaign, Phone,
};

/// Persistent home of campaign records.
///
/// `set_status`, `update_progress` and `finalize` are field-level updates:
/// implementations must not require the caller to read-modify-write the
/// whole record. The dispatch engine is the only writer of counters and
/// status after creation.
#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn create(&self, new: NewCampaign) -> Result<Campaign, StoreError>;

    async fn get(&self, id: &CampaignId) -> Result<Campaign, StoreError>;

    async fn set_status(&self, id: &CampaignId, status: CampaignStatus)
        -> Result<(), StoreError>;

    /// Write cumulative counters. Values are absolute, not deltas; the
    /// engine is the single writer, so the latest write always carries the
    /// highest totals.
    async fn update_progress(
        &self,
        id: &CampaignId,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), StoreError>;

    /// Terminal write: final status and counters in one update.
    async fn finalize(
        &self,
        id: &CampaignId,
        status: CampaignStatus,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), StoreError>;
}

/// Append-only message log.
#[async_trait]
pub trait MessageLogStore: Send + Sync {
    /// Insert a batch of entries, unordered. A failing entry must not block
    /// sibling entries; the returned count is how many were written.
    async fn bulk_insert(&self, entries: Vec<MessageLogEntry>) -> Result<usize, StoreError>;

    async fn insert(&self, entry: MessageLogEntry) -> Result<MessageLogEntry, StoreError>;

    /// Most recent outgoing entry for a phone number, used to attribute
    /// inbound messages to a campaign.
    async fn latest_outgoing(&self, phone: &Phone)
        -> Result<Option<MessageLogEntry>, StoreError>;

    async fn mark_read(&self, id: &MessageId) -> Result<(), StoreError>;
}

/// In-memory campaign store for tests and lightweight deployments.
#[derive(Default)]
pub struct InMemoryCampaignStore {
    campaigns: Mutex<HashMap<CampaignId, Campaign>>,
}

impl InMemoryCampaignStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CampaignStore for InMemoryCampaignStore {
    async fn create(&self, new: NewCampaign) -> Result<Campaign, StoreError> {
        let now = Utc::now();
        let campaign = Campaign {
            id: CampaignId(uuid::Uuid::new_v4().to_string()),
            media_type: new.media_type,
            message: new.message,
            media_url: new.media_url,
            total_contacts: new.total_contacts,
            sent_count: 0,
            failed_count: 0,
            status: CampaignStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let mut guard = self.campaigns.lock().await;
        guard.insert(campaign.id.clone(), campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: &CampaignId) -> Result<Campaign, StoreError> {
        let guard = self.campaigns.lock().await;
        guard.get(id).cloned().ok_or(StoreError::NotFound)
    }

    async fn set_status(
        &self,
        id: &CampaignId,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        let mut guard = self.campaigns.lock().await;
        let campaign = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        campaign.status = status;
        campaign.updated_at = Utc::now();
        Ok(())
    }

    async fn update_progress(
        &self,
        id: &CampaignId,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), StoreError> {
        let mut guard = self.campaigns.lock().await;
        let campaign = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        campaign.sent_count = sent_count;
        campaign.failed_count = failed_count;
        campaign.updated_at = Utc::now();
        Ok(())
    }

    async fn finalize(
        &self,
        id: &CampaignId,
        status: CampaignStatus,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), StoreError> {
        let mut guard = self.campaigns.lock().await;
        let campaign = guard.get_mut(id).ok_or(StoreError::NotFound)?;
        campaign.status = status;
        campaign.sent_count = sent_count;
        campaign.failed_count = failed_count;
        campaign.updated_at = Utc::now();
        Ok(())
    }
}

/// In-memory message log for tests and lightweight deployments.
#[derive(Default)]
pub struct InMemoryMessageLogStore {
    entries: Mutex<Vec<MessageLogEntry>>,
}

impl InMemoryMessageLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far, in insertion order.
    pub async fn entries(&self) -> Vec<MessageLogEntry> {
        self.entries.lock().await.clone()
    }

    /// All entries for one campaign, in insertion order.
    pub async fn entries_for_campaign(&self, id: &CampaignId) -> Vec<MessageLogEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|entry| entry.campaign_id.as_ref() == Some(id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageLogStore for InMemoryMessageLogStore {
    async fn bulk_insert(&self, entries: Vec<MessageLogEntry>) -> Result<usize, StoreError> {
        let count = entries.len();
        self.entries.lock().await.extend(entries);
        Ok(count)
    }

    async fn insert(&self, entry: MessageLogEntry) -> Result<MessageLogEntry, StoreError> {
        self.entries.lock().await.push(entry.clone());
        Ok(entry)
    }

    async fn latest_outgoing(
        &self,
        phone: &Phone,
    ) -> Result<Option<MessageLogEntry>, StoreError> {
        let guard = self.entries.lock().await;
        Ok(guard
            .iter()
            .filter(|entry| {
                entry.phone == *phone
                    && matches!(entry.direction, crate::types::Direction::Outgoing)
            })
            .max_by_key(|entry| entry.timestamp)
            .cloned())
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), StoreError> {
        let mut guard = self.entries.lock().await;
        let entry = guard
            .iter_mut()
            .find(|entry| entry.id == *id)
            .ok_or(StoreError::NotFound)?;
        entry.is_read = true;
        Ok(())
    }
}
