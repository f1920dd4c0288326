use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bulk-send job: a message payload plus a set of targets.
///
/// A `Campaign` is owned by the campaign store. After creation it is mutated
/// only by the dispatch engine: counters only grow, and status only moves
/// forward (`pending -> sending -> completed | failed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Store-assigned identifier.
    pub id: CampaignId,

    /// Kind of message this campaign delivers. Immutable after creation.
    pub media_type: MediaType,

    /// Text content, or the caption for image/video campaigns.
    pub message: Option<String>,

    /// Resolved media location. Required for image/video campaigns.
    pub media_url: Option<String>,

    /// Number of targets, fixed at creation time.
    pub total_contacts: u32,

    /// Messages delivered so far. Monotonic.
    pub sent_count: u32,

    /// Messages that exhausted their retries. Monotonic.
    pub failed_count: u32,

    pub status: CampaignStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Fraction of targets delivered, as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total_contacts == 0 {
            return 0.0;
        }
        (self.sent_count as f64 / self.total_contacts as f64) * 100.0
    }
}

/// Fields required to create a campaign. The store fills in the id,
/// timestamps, zeroed counters and `Pending` status.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub media_type: MediaType,
    pub message: Option<String>,
    pub media_url: Option<String>,
    pub total_contacts: u32,
}

/// Unique identifier for a campaign.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of campaign ids with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub String);

/// Unique identifier for a message log entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// A single recipient phone number, normalized to bare digits
/// (10-15 digits, international format without the `+`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Phone(pub String);

impl Phone {
    pub fn new(digits: impl Into<String>) -> Self {
        Self(digits.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Text,
    Image,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Pending,
    Sending,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Whether a campaign in this status will never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }
}

/// Message direction relative to this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// Per-message delivery status as recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Failed,
    Delivered,
    Read,
}

/// The content side of a campaign: what gets sent to every target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub media_type: MediaType,
    pub message: Option<String>,
    pub media_url: Option<String>,
}

impl MessagePayload {
    /// Plain text message.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Text,
            message: Some(body.into()),
            media_url: None,
        }
    }

    /// Image message. Caption is optional, see [`MessagePayload::with_caption`].
    pub fn image(media_url: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Image,
            message: None,
            media_url: Some(media_url.into()),
        }
    }

    /// Video message. Caption is optional, see [`MessagePayload::with_caption`].
    pub fn video(media_url: impl Into<String>) -> Self {
        Self {
            media_type: MediaType::Video,
            message: None,
            media_url: Some(media_url.into()),
        }
    }

    /// Set the caption shown alongside image/video media.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.message = Some(caption.into());
        self
    }
}

/// Tuning knobs for one campaign's dispatch.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Targets per persistence batch. One counter write and one bulk log
    /// insert happen per batch.
    pub batch_size: usize,

    /// Maximum sends logically in flight at once within a batch.
    pub concurrency_limit: usize,

    /// Pacing delay applied before each target's attempt sequence.
    pub per_message_delay: Duration,

    /// Retries after the initial attempt. Total attempts = retry_attempts + 1.
    pub retry_attempts: u32,

    /// Fixed wait between attempts.
    pub retry_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            concurrency_limit: 5,
            per_message_delay: Duration::from_millis(500),
            retry_attempts: 1,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

impl DispatchConfig {
    /// Read recognized options from the environment, falling back to
    /// defaults for anything missing or unparsable.
    ///
    /// Recognized: `BATCH_SIZE`, `CONCURRENCY_LIMIT`, `MESSAGE_DELAY_MS`,
    /// `RETRY_ATTEMPTS`, `RETRY_BACKOFF_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_parse("BATCH_SIZE").unwrap_or(defaults.batch_size),
            concurrency_limit: env_parse("CONCURRENCY_LIMIT")
                .unwrap_or(defaults.concurrency_limit),
            per_message_delay: env_parse("MESSAGE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.per_message_delay),
            retry_attempts: env_parse("RETRY_ATTEMPTS").unwrap_or(defaults.retry_attempts),
            retry_backoff: env_parse("RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// A unit of work consumed by engine workers: one campaign's resolved
/// targets plus its payload and tuning. Ephemeral, never shared across
/// campaigns.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub campaign_id: CampaignId,
    pub targets: Vec<Phone>,
    pub payload: MessagePayload,
    pub config: DispatchConfig,
}

impl DispatchJob {
    pub fn new(campaign_id: CampaignId, targets: Vec<Phone>, payload: MessagePayload) -> Self {
        Self {
            campaign_id,
            targets,
            payload,
            config: DispatchConfig::default(),
        }
    }

    /// Override the default dispatch tuning for this job.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }
}

/// One append-only log record: the outcome of a delivery attempt sequence,
/// or an inbound message received from the gateway's webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub id: MessageId,

    /// Null for inbound messages with no resolvable campaign.
    pub campaign_id: Option<CampaignId>,

    pub phone: Phone,
    pub direction: Direction,
    pub media_type: MediaType,
    pub content: Option<String>,
    pub status: MessageStatus,

    /// Failure reason text, present only for failed outgoing entries.
    pub error: Option<String>,

    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

impl MessageLogEntry {
    /// Build an outgoing entry for one target's terminal outcome.
    pub fn outgoing(
        campaign_id: CampaignId,
        phone: Phone,
        media_type: MediaType,
        content: Option<String>,
        status: MessageStatus,
        error: Option<String>,
    ) -> Self {
        Self {
            id: MessageId(uuid::Uuid::new_v4().to_string()),
            campaign_id: Some(campaign_id),
            phone,
            direction: Direction::Outgoing,
            media_type,
            content,
            status,
            error,
            timestamp: Utc::now(),
            is_read: false,
        }
    }
}

/// Totals returned once a campaign's dispatch reaches a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent_count: u32,
    pub failed_count: u32,
}
