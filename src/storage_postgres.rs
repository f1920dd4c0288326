#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use chrono::{DateTime, Utc};
#[cfg(feature = "postgres")]
use tokio_postgres::Client;

#[cfg(feature = "postgres")]
use crate::error::StoreError;
#[cfg(feature = "postgres")]
use crate::store::{CampaignStore, MessageLogStore};
#[cfg(feature = "postgres")]
use crate::types::{
    Campaign, CampaignId, CampaignStatus, Direction, MediaType, MessageId, MessageLogEntry,
    MessageStatus, NewCampaign, Phone,
};

/// Postgres-backed campaign and message-log persistence.
///
/// One struct implements both store traits so a single connection can be
/// shared: `Arc<PostgresStore>` coerces to either trait object.
#[cfg(feature = "postgres")]
pub struct PostgresStore {
    client: Client,
}

#[cfg(feature = "postgres")]
impl PostgresStore {
    pub async fn new(client: Client) -> Result<Self, tokio_postgres::Error> {
        client
            .execute(
                "CREATE TABLE IF NOT EXISTS campaigns (
                    id TEXT PRIMARY KEY,
                    media_type TEXT NOT NULL,
                    message TEXT,
                    media_url TEXT,
                    total_contacts INT NOT NULL,
                    sent_count INT NOT NULL DEFAULT 0,
                    failed_count INT NOT NULL DEFAULT 0,
                    status TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    updated_at TIMESTAMPTZ NOT NULL
                )",
                &[],
            )
            .await?;

        client
            .execute(
                "CREATE TABLE IF NOT EXISTS message_logs (
                    id TEXT PRIMARY KEY,
                    campaign_id TEXT,
                    phone TEXT NOT NULL,
                    direction TEXT NOT NULL,
                    media_type TEXT NOT NULL,
                    content TEXT,
                    status TEXT NOT NULL,
                    error TEXT,
                    timestamp TIMESTAMPTZ NOT NULL,
                    is_read BOOL NOT NULL DEFAULT FALSE
                )",
                &[],
            )
            .await?;

        client
            .execute(
                "CREATE INDEX IF NOT EXISTS message_logs_phone_ts
                 ON message_logs (phone, timestamp DESC)",
                &[],
            )
            .await?;

        Ok(Self { client })
    }

    fn row_to_campaign(row: &tokio_postgres::Row) -> Result<Campaign, StoreError> {
        Ok(Campaign {
            id: CampaignId(row.try_get("id").map_err(backend)?),
            media_type: parse_media_type(row.try_get("media_type").map_err(backend)?)?,
            message: row.try_get("message").map_err(backend)?,
            media_url: row.try_get("media_url").map_err(backend)?,
            total_contacts: row.try_get::<_, i32>("total_contacts").map_err(backend)? as u32,
            sent_count: row.try_get::<_, i32>("sent_count").map_err(backend)? as u32,
            failed_count: row.try_get::<_, i32>("failed_count").map_err(backend)? as u32,
            status: parse_status(row.try_get("status").map_err(backend)?)?,
            created_at: row.try_get("created_at").map_err(backend)?,
            updated_at: row.try_get("updated_at").map_err(backend)?,
        })
    }

    fn row_to_entry(row: &tokio_postgres::Row) -> Result<MessageLogEntry, StoreError> {
        Ok(MessageLogEntry {
            id: MessageId(row.try_get("id").map_err(backend)?),
            campaign_id: row
                .try_get::<_, Option<String>>("campaign_id")
                .map_err(backend)?
                .map(CampaignId),
            phone: Phone(row.try_get("phone").map_err(backend)?),
            direction: parse_direction(row.try_get("direction").map_err(backend)?)?,
            media_type: parse_media_type(row.try_get("media_type").map_err(backend)?)?,
            content: row.try_get("content").map_err(backend)?,
            status: parse_message_status(row.try_get("status").map_err(backend)?)?,
            error: row.try_get("error").map_err(backend)?,
            timestamp: row.try_get("timestamp").map_err(backend)?,
            is_read: row.try_get("is_read").map_err(backend)?,
        })
    }

    async fn insert_entry(&self, entry: &MessageLogEntry) -> Result<(), tokio_postgres::Error> {
        self.client
            .execute(
                "INSERT INTO message_logs
                    (id, campaign_id, phone, direction, media_type, content,
                     status, error, timestamp, is_read)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                 ON CONFLICT (id) DO NOTHING",
                &[
                    &entry.id.0,
                    &entry.campaign_id.as_ref().map(|id| id.0.clone()),
                    &entry.phone.0,
                    &direction_str(entry.direction),
                    &media_type_str(entry.media_type),
                    &entry.content,
                    &message_status_str(entry.status),
                    &entry.error,
                    &entry.timestamp,
                    &entry.is_read,
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl CampaignStore for PostgresStore {
    async fn create(&self, new: NewCampaign) -> Result<Campaign, StoreError> {
        let now: DateTime<Utc> = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();

        self.client
            .execute(
                "INSERT INTO campaigns
                    (id, media_type, message, media_url, total_contacts,
                     sent_count, failed_count, status, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, 0, 0, $6, $7, $7)",
                &[
                    &id,
                    &media_type_str(new.media_type),
                    &new.message,
                    &new.media_url,
                    &(new.total_contacts as i32),
                    &status_str(CampaignStatus::Pending),
                    &now,
                ],
            )
            .await
            .map_err(backend)?;

        Ok(Campaign {
            id: CampaignId(id),
            media_type: new.media_type,
            message: new.message,
            media_url: new.media_url,
            total_contacts: new.total_contacts,
            sent_count: 0,
            failed_count: 0,
            status: CampaignStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: &CampaignId) -> Result<Campaign, StoreError> {
        let row = self
            .client
            .query_opt("SELECT * FROM campaigns WHERE id = $1", &[&id.0])
            .await
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;

        Self::row_to_campaign(&row)
    }

    async fn set_status(
        &self,
        id: &CampaignId,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        let updated = self
            .client
            .execute(
                "UPDATE campaigns SET status = $2, updated_at = $3 WHERE id = $1",
                &[&id.0, &status_str(status), &Utc::now()],
            )
            .await
            .map_err(backend)?;

        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_progress(
        &self,
        id: &CampaignId,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), StoreError> {
        let updated = self
            .client
            .execute(
                "UPDATE campaigns
                 SET sent_count = $2, failed_count = $3, updated_at = $4
                 WHERE id = $1",
                &[
                    &id.0,
                    &(sent_count as i32),
                    &(failed_count as i32),
                    &Utc::now(),
                ],
            )
            .await
            .map_err(backend)?;

        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn finalize(
        &self,
        id: &CampaignId,
        status: CampaignStatus,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<(), StoreError> {
        let updated = self
            .client
            .execute(
                "UPDATE campaigns
                 SET status = $2, sent_count = $3, failed_count = $4, updated_at = $5
                 WHERE id = $1",
                &[
                    &id.0,
                    &status_str(status),
                    &(sent_count as i32),
                    &(failed_count as i32),
                    &Utc::now(),
                ],
            )
            .await
            .map_err(backend)?;

        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl MessageLogStore for PostgresStore {
    async fn bulk_insert(&self, entries: Vec<MessageLogEntry>) -> Result<usize, StoreError> {
        // Unordered semantics: each row stands alone, a failing row never
        // blocks its siblings.
        let mut written = 0usize;
        for entry in &entries {
            match self.insert_entry(entry).await {
                Ok(()) => written += 1,
                Err(error) => {
                    tracing::warn!(message = %entry.id.0, %error, "failed to insert log entry");
                }
            }
        }
        Ok(written)
    }

    async fn insert(&self, entry: MessageLogEntry) -> Result<MessageLogEntry, StoreError> {
        self.insert_entry(&entry).await.map_err(backend)?;
        Ok(entry)
    }

    async fn latest_outgoing(
        &self,
        phone: &Phone,
    ) -> Result<Option<MessageLogEntry>, StoreError> {
        let row = self
            .client
            .query_opt(
                "SELECT * FROM message_logs
                 WHERE phone = $1 AND direction = 'outgoing'
                 ORDER BY timestamp DESC
                 LIMIT 1",
                &[&phone.0],
            )
            .await
            .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(Self::row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), StoreError> {
        let updated = self
            .client
            .execute(
                "UPDATE message_logs SET is_read = TRUE WHERE id = $1",
                &[&id.0],
            )
            .await
            .map_err(backend)?;

        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[cfg(feature = "postgres")]
fn backend(error: tokio_postgres::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

#[cfg(feature = "postgres")]
fn media_type_str(media_type: MediaType) -> &'static str {
    match media_type {
        MediaType::Text => "text",
        MediaType::Image => "image",
        MediaType::Video => "video",
    }
}

#[cfg(feature = "postgres")]
fn parse_media_type(value: String) -> Result<MediaType, StoreError> {
    match value.as_str() {
        "text" => Ok(MediaType::Text),
        "image" => Ok(MediaType::Image),
        "video" => Ok(MediaType::Video),
        other => Err(StoreError::Backend(format!("unknown media type: {other}"))),
    }
}

#[cfg(feature = "postgres")]
fn status_str(status: CampaignStatus) -> &'static str {
    match status {
        CampaignStatus::Pending => "pending",
        CampaignStatus::Sending => "sending",
        CampaignStatus::Completed => "completed",
        CampaignStatus::Failed => "failed",
    }
}

#[cfg(feature = "postgres")]
fn parse_status(value: String) -> Result<CampaignStatus, StoreError> {
    match value.as_str() {
        "pending" => Ok(CampaignStatus::Pending),
        "sending" => Ok(CampaignStatus::Sending),
        "completed" => Ok(CampaignStatus::Completed),
        "failed" => Ok(CampaignStatus::Failed),
        other => Err(StoreError::Backend(format!("unknown status: {other}"))),
    }
}

#[cfg(feature = "postgres")]
fn direction_str(direction: Direction) -> &'static str {
    match direction {
        Direction::Outgoing => "outgoing",
        Direction::Incoming => "incoming",
    }
}

#[cfg(feature = "postgres")]
fn parse_direction(value: String) -> Result<Direction, StoreError> {
    match value.as_str() {
        "outgoing" => Ok(Direction::Outgoing),
        "incoming" => Ok(Direction::Incoming),
        other => Err(StoreError::Backend(format!("unknown direction: {other}"))),
    }
}

#[cfg(feature = "postgres")]
fn message_status_str(status: MessageStatus) -> &'static str {
    match status {
        MessageStatus::Sent => "sent",
        MessageStatus::Failed => "failed",
        MessageStatus::Delivered => "delivered",
        MessageStatus::Read => "read",
    }
}

#[cfg(feature = "postgres")]
fn parse_message_status(value: String) -> Result<MessageStatus, StoreError> {
    match value.as_str() {
        "sent" => Ok(MessageStatus::Sent),
        "failed" => Ok(MessageStatus::Failed),
        "delivered" => Ok(MessageStatus::Delivered),
        "read" => Ok(MessageStatus::Read),
        other => Err(StoreError::Backend(format!("unknown message status: {other}"))),
    }
}
