//! Tag notifications
//!
//! One notification is published per detected tag, on a topic derived from
//! the tag name. Delivery is fire-and-forget: failures are logged and never
//! reach the ingesting request.

use async_trait::async_trait;
use birdtag_core::{AppError, MediaId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Message published for one detected tag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagNotification {
    pub url: String,
    pub media_id: MediaId,
    pub tag: String,
    pub count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Topic for a tag: lower-case, spaces and underscores become `-`.
pub fn topic_for(tag: &str) -> String {
    tag.trim()
        .chars()
        .map(|c| match c {
            ' ' | '_' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, topic: &str, notification: &TagNotification) -> Result<(), AppError>;
}

/// Publish every notification on a background task.
pub fn publish_detached(sink: Arc<dyn NotificationSink>, notifications: Vec<TagNotification>) {
    if notifications.is_empty() {
        return;
    }
    tokio::spawn(async move {
        for notification in notifications {
            let topic = topic_for(&notification.tag);
            if let Err(e) = sink.publish(&topic, &notification).await {
                tracing::warn!(
                    error = %e,
                    topic = %topic,
                    media_id = %notification.media_id,
                    "Tag notification failed"
                );
            }
        }
    });
}

/// Sink that only logs; used when no delivery endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn publish(&self, topic: &str, notification: &TagNotification) -> Result<(), AppError> {
        tracing::info!(
            topic = %topic,
            media_id = %notification.media_id,
            count = notification.count,
            url = %notification.url,
            "Tag notification"
        );
        Ok(())
    }
}

#[cfg(feature = "webhook")]
pub use webhook::WebhookNotificationSink;

#[cfg(feature = "webhook")]
mod webhook {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use std::time::Duration;

    pub const SIGNATURE_HEADER: &str = "X-Birdtag-Signature";
    pub const TOPIC_HEADER: &str = "X-Birdtag-Topic";

    type HmacSha256 = Hmac<Sha256>;

    #[derive(Serialize)]
    struct Envelope<'a> {
        topic: &'a str,
        message: &'a TagNotification,
    }

    /// POSTs each notification as JSON, signed with HMAC-SHA256 over the body.
    #[derive(Clone)]
    pub struct WebhookNotificationSink {
        client: reqwest::Client,
        url: String,
        secret: String,
    }

    impl WebhookNotificationSink {
        pub fn new(url: String, secret: String) -> Result<Self, AppError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
            Ok(Self {
                client,
                url,
                secret,
            })
        }

        /// `sha256=<hex hmac>` of the body.
        pub fn sign(secret: &str, body: &[u8]) -> Result<String, AppError> {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|e| AppError::Internal(format!("Invalid webhook secret: {}", e)))?;
            mac.update(body);
            Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
        }
    }

    #[async_trait]
    impl NotificationSink for WebhookNotificationSink {
        async fn publish(
            &self,
            topic: &str,
            notification: &TagNotification,
        ) -> Result<(), AppError> {
            let body = serde_json::to_vec(&Envelope {
                topic,
                message: notification,
            })?;
            let signature = Self::sign(&self.secret, &body)?;

            let response = self
                .client
                .post(&self.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(SIGNATURE_HEADER, signature)
                .header(TOPIC_HEADER, topic)
                .body(body)
                .send()
                .await
                .map_err(|e| AppError::Internal(format!("Webhook delivery failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(AppError::Internal(format!(
                    "Webhook endpoint returned {}",
                    response.status()
                )));
            }

            tracing::debug!(topic = %topic, media_id = %notification.media_id, "Tag notification delivered");
            Ok(())
        }
    }

}
