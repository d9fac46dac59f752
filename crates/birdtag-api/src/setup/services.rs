//! Service wiring

use anyhow::Result;
use birdtag_core::Config;
use birdtag_db::{MediaCatalogStore, TagIndexStore};
use birdtag_services::{LogNotificationSink, NotificationSink};
use birdtag_storage::ObjectStorage;
use std::sync::Arc;

use crate::state::AppState;

pub fn initialize_services(
    config: &Config,
    tag_index: Arc<dyn TagIndexStore>,
    catalog: Arc<dyn MediaCatalogStore>,
    storage: Arc<dyn ObjectStorage>,
) -> Result<Arc<AppState>> {
    let notifier = setup_notifier(config)?;
    Ok(Arc::new(AppState::new(
        config.clone(),
        tag_index,
        catalog,
        storage,
        notifier,
    )))
}

/// Webhook delivery when an endpoint is configured, logging otherwise.
fn setup_notifier(config: &Config) -> Result<Arc<dyn NotificationSink>> {
    #[cfg(feature = "webhook")]
    {
        if let Some(url) = &config.notify_webhook_url {
            let secret = config.notify_webhook_secret.clone().unwrap_or_default();
            let sink = birdtag_services::WebhookNotificationSink::new(url.clone(), secret)?;
            tracing::info!(url = %url, "Tag notifications delivered by webhook");
            return Ok(Arc::new(sink));
        }
    }

    #[cfg(not(feature = "webhook"))]
    {
        if config.notify_webhook_url.is_some() {
            tracing::warn!("NOTIFY_WEBHOOK_URL set but the webhook feature is disabled; logging notifications instead");
        }
    }

    tracing::info!("Tag notifications are logged only");
    Ok(Arc::new(LogNotificationSink))
}
