use async_trait::async_trait;

use crate::error::FailureReason;
use crate::types::{MediaType, MessagePayload, Phone};

#[cfg(feature = "http")]
use std::time::Duration;

#[cfg(feature = "http")]
use crate::error::ConfigError;

/// Capability set the engine needs from the external message provider.
///
/// Success values from the provider are opaque to the engine and therefore
/// not surfaced here. Failures come back classified so the log can record
/// why a target failed; the engine itself retries every class uniformly.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_text(&self, to: &Phone, body: &str) -> Result<(), FailureReason>;

    async fn send_image(
        &self,
        to: &Phone,
        media_url: &str,
        caption: &str,
    ) -> Result<(), FailureReason>;

    async fn send_video(
        &self,
        to: &Phone,
        media_url: &str,
        caption: &str,
    ) -> Result<(), FailureReason>;
}

/// Route one payload to the matching gateway capability.
///
/// Image/video payloads without a media URL are refused up front and
/// classified as client-rejected, the same as a gateway-side validation
/// refusal.
pub async fn send_payload(
    gateway: &dyn Gateway,
    to: &Phone,
    payload: &MessagePayload,
) -> Result<(), FailureReason> {
    let caption = payload.message.as_deref().unwrap_or_default();

    match payload.media_type {
        MediaType::Text => gateway.send_text(to, caption).await,
        MediaType::Image => match payload.media_url.as_deref() {
            Some(url) => gateway.send_image(to, url, caption).await,
            None => Err(FailureReason::ClientRejected),
        },
        MediaType::Video => match payload.media_url.as_deref() {
            Some(url) => gateway.send_video(to, url, caption).await,
            None => Err(FailureReason::ClientRejected),
        },
    }
}

/// UltraMsg WhatsApp HTTP API client.
///
/// Constructed explicitly and injected into the engine, so campaigns and
/// tests can use independent instances.
#[cfg(feature = "http")]
pub struct UltraMsgClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[cfg(feature = "http")]
impl UltraMsgClient {
    /// Build a client for the given instance base URL
    /// (e.g. `https://api.ultramsg.com/instance12345`).
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Build a client from `ULTRAMESSAGE_BASE_URL` and `ULTRAMESSAGE_TOKEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("ULTRAMESSAGE_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("ULTRAMESSAGE_BASE_URL"))?;
        let token = std::env::var("ULTRAMESSAGE_TOKEN")
            .map_err(|_| ConfigError::MissingVar("ULTRAMESSAGE_TOKEN"))?;
        Ok(Self::new(base_url, token))
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<(), FailureReason> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .query(&[("token", self.token.as_str())])
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    Ok(())
                } else if status.is_client_error() {
                    Err(FailureReason::ClientRejected)
                } else {
                    Err(FailureReason::RemoteError)
                }
            }
            // Timeouts and transport failures both mean "no response".
            Err(_) => Err(FailureReason::Unreachable),
        }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Gateway for UltraMsgClient {
    async fn send_text(&self, to: &Phone, body: &str) -> Result<(), FailureReason> {
        tracing::debug!(phone = %to.0, "sending text message");
        self.post(
            "/messages/chat",
            serde_json::json!({ "to": to.0, "body": body }),
        )
        .await
    }

    async fn send_image(
        &self,
        to: &Phone,
        media_url: &str,
        caption: &str,
    ) -> Result<(), FailureReason> {
        tracing::debug!(phone = %to.0, "sending image message");
        self.post(
            "/messages/image",
            serde_json::json!({ "to": to.0, "image": media_url, "caption": caption }),
        )
        .await
    }

    async fn send_video(
        &self,
        to: &Phone,
        media_url: &str,
        caption: &str,
    ) -> Result<(), FailureReason> {
        tracing::debug!(phone = %to.0, "sending video message");
        self.post(
            "/messages/video",
            serde_json::json!({ "to": to.0, "video": media_url, "caption": caption }),
        )
        .await
    }
}
