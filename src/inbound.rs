use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::store::MessageLogStore;
use crate::types::{Direction, MediaType, MessageId, MessageLogEntry, MessageStatus, Phone};

/// An inbound message as reported by the gateway's webhook, already
/// extracted from the provider's wire format by the caller.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub phone: Phone,
    pub media_type: MediaType,
    pub content: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Record an inbound message in the log.
///
/// The message is attributed to the campaign of the most recent outgoing
/// entry for the same phone number; with no such entry the campaign stays
/// null. Inbound entries land as `delivered` and unread.
pub async fn record_incoming(
    logs: &dyn MessageLogStore,
    incoming: IncomingMessage,
) -> Result<MessageLogEntry, StoreError> {
    let campaign_id = logs
        .latest_outgoing(&incoming.phone)
        .await?
        .and_then(|entry| entry.campaign_id);

    let entry = MessageLogEntry {
        id: MessageId(uuid::Uuid::new_v4().to_string()),
        campaign_id,
        phone: incoming.phone,
        direction: Direction::Incoming,
        media_type: incoming.media_type,
        content: incoming.content,
        status: MessageStatus::Delivered,
        error: None,
        timestamp: incoming.timestamp.unwrap_or_else(Utc::now),
        is_read: false,
    };

    let entry = logs.insert(entry).await?;
    tracing::info!(message = %entry.id.0, phone = %entry.phone.0, "incoming message saved");
    Ok(entry)
}
