//! A bulk campaign dispatch engine for WhatsApp-style gateways.
//!
//! Given a campaign (a message payload plus an ordered set of phone-number
//! targets), this crate delivers one outbound message per target through an
//! external gateway, under **bounded concurrency**, with per-message retry,
//! batched persistence of results and monotonic status/progress tracking
//! that survives partial failure.
//!
//! ## Guarantees
//! - At-least-once delivery attempts with logged outcome per target
//! - Bounded in-flight sends per campaign
//! - One counter write and one bulk log insert per batch
//! - A terminal campaign status (`completed` or `failed`) for every
//!   accepted job, regardless of per-target failures
//!
//! ## Non-Guarantees
//! - Exactly-once delivery to the gateway
//! - Ordering of results within the log beyond per-batch grouping
//! - Synchronous campaign completion (callers never block on delivery)
//!
//! The HTTP API surface, file handling and store query layers live outside
//! this crate; it consumes a [`Gateway`] and the two store traits and owns
//! everything in between.

mod engine;
mod error;
mod gateway;
mod inbound;
mod retry;
mod runner;
mod store;
mod targets;
mod types;

#[cfg(feature = "postgres")]
mod storage_postgres;

pub use engine::{DispatchEngine, EngineConfig};
pub use error::{ConfigError, DispatchError, FailureReason, StoreError, TargetError};
pub use gateway::{send_payload, Gateway};
pub use inbound::{record_incoming, IncomingMessage};
pub use retry::send_with_retry;
pub use runner::{run_batch, TargetOutcome};
pub use store::{
    CampaignStore, InMemoryCampaignStore, InMemoryMessageLogStore, MessageLogStore,
};
pub use targets::{parse_phone, parse_targets};
pub use types::{
    Campaign, CampaignId, CampaignStatus, Direction, DispatchConfig, DispatchJob,
    DispatchSummary, MediaType, MessageId, MessageLogEntry, MessagePayload, MessageStatus,
    NewCampaign, Phone,
};

#[cfg(feature = "http")]
pub use gateway::UltraMsgClient;

#[cfg(feature = "postgres")]
pub use storage_postgres::PostgresStore;
