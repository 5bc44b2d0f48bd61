//! Webhook delivery.
//!
//! [`WebhookDispatcher::dispatch`] runs on the caller's thread only long
//! enough to read a config snapshot; building the payload, resolving the
//! thumbnail and the HTTP exchange all happen on the [`IoLane`].
//!
//! A 429 response is retried once after the server-provided delay. Every
//! other failure is logged and dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::broadcast::LocalBroadcaster;
use crate::config::{ConfigStore, NotificationConfig};
use crate::enrichment::{normalize_catalog_key, EnrichmentCache, HTTP_TIMEOUT, USER_AGENT};
use crate::error::DeliveryError;
use crate::lane::IoLane;
use crate::notification::Notification;
use crate::obs;

/// Longest server-requested delay honoured before the single retry. A 429
/// asking for more is treated as a failed delivery.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Shown in-session when a notification cannot go out because no webhook
/// URL has been set.
pub const NOT_CONFIGURED_NOTICE: &str =
    "Webhook is not configured; set a webhook URL to enable remote notifications.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footer {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 0xRRGGBB
    pub color: u32,
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    pub footer: Footer,
    /// ISO-8601
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedMentions {
    pub parse: Vec<String>,
}

/// Request body: one message carrying one embed, with mentions disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub allowed_mentions: AllowedMentions,
}

impl WebhookPayload {
    pub fn single(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
            allowed_mentions: AllowedMentions::default(),
        }
    }
}

/// What the server answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl WebhookResponse {
    pub fn is_success(&self) -> bool {
        self.status < 300
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    fn into_error(self) -> DeliveryError {
        if self.is_rate_limited() {
            DeliveryError::RateLimited {
                retry_after: self.retry_after,
            }
        } else {
            DeliveryError::Status {
                status: self.status,
                body: self.body,
            }
        }
    }
}

/// Sends one JSON POST. `Err` only for transport-level failures; any HTTP
/// status comes back as a [`WebhookResponse`].
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<WebhookResponse, DeliveryError>;
}

/// reqwest-backed transport with the standard 8 second timeout.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<WebhookResponse, DeliveryError> {
        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status().as_u16();
        let header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        let retry_after = parse_retry_after(header.as_deref(), &body);

        Ok(WebhookResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Retry delay from a `Retry-After` header (seconds, fractional allowed),
/// falling back to a `retry_after` field in a JSON body.
pub fn parse_retry_after(header: Option<&str>, body: &str) -> Option<Duration> {
    let from_header = header.and_then(|h| h.trim().parse::<f64>().ok());
    let seconds = from_header.or_else(|| {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        match value.get("retry_after")? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    })?;

    Duration::try_from_secs_f64(seconds).ok()
}

/// Result of one delivery attempt sequence.
#[derive(Debug)]
pub enum Delivery {
    Delivered,
    DeliveredAfterRetry,
    Failed(DeliveryError),
}

/// POST `payload`, retrying exactly once on a 429 that names a delay of
/// at most [`MAX_RETRY_AFTER`].
pub async fn send_with_retry(
    transport: &dyn WebhookTransport,
    url: &str,
    payload: &WebhookPayload,
) -> Delivery {
    let first = match transport.post(url, payload).await {
        Ok(response) => response,
        Err(e) => {
            obs::emit_delivery_failed(&e);
            return Delivery::Failed(e);
        }
    };

    if first.is_success() {
        return Delivery::Delivered;
    }

    let delay = match (first.is_rate_limited(), first.retry_after) {
        (true, Some(delay)) if delay <= MAX_RETRY_AFTER => delay,
        _ => {
            let e = first.into_error();
            obs::emit_delivery_failed(&e);
            return Delivery::Failed(e);
        }
    };

    obs::emit_rate_limited(delay);
    tokio::time::sleep(delay).await;

    match transport.post(url, payload).await {
        Ok(response) if response.is_success() => Delivery::DeliveredAfterRetry,
        Ok(response) => {
            let e = response.into_error();
            obs::emit_retry_failed(&e);
            Delivery::Failed(e)
        }
        Err(e) => {
            obs::emit_retry_failed(&e);
            Delivery::Failed(e)
        }
    }
}

/// What `dispatch` did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the background lane
    Queued,
    /// Webhooks switched off
    Disabled,
    /// No target URL; a local notice was raised instead
    NotConfigured,
    /// The lane has shut down
    LaneClosed,
}

/// Builds and delivers webhook messages off the caller's thread.
pub struct WebhookDispatcher {
    config: Arc<ConfigStore>,
    lane: Arc<IoLane>,
    transport: Arc<dyn WebhookTransport>,
    enrichment: Arc<EnrichmentCache>,
    broadcaster: Arc<LocalBroadcaster>,
}

impl WebhookDispatcher {
    pub fn new(
        config: Arc<ConfigStore>,
        lane: Arc<IoLane>,
        transport: Arc<dyn WebhookTransport>,
        enrichment: Arc<EnrichmentCache>,
        broadcaster: Arc<LocalBroadcaster>,
    ) -> Self {
        Self {
            config,
            lane,
            transport,
            enrichment,
            broadcaster,
        }
    }

    /// Queue `notification` for delivery. Never blocks on I/O.
    pub fn dispatch(&self, notification: Notification) -> DispatchOutcome {
        let snapshot = self.config.snapshot();
        if !snapshot.webhook_enabled {
            debug!(entity_id = %notification.entity_id, "webhook disabled, skipping");
            return DispatchOutcome::Disabled;
        }
        let Some(target) = snapshot.webhook_target().map(str::to_string) else {
            obs::emit_webhook_not_configured();
            self.broadcaster.notice(NOT_CONFIGURED_NOTICE);
            return DispatchOutcome::NotConfigured;
        };

        let job = DeliveryJob {
            target,
            notification,
            snapshot,
            config: Arc::clone(&self.config),
            transport: Arc::clone(&self.transport),
            enrichment: Arc::clone(&self.enrichment),
        };

        if self.lane.submit(job.run()) {
            DispatchOutcome::Queued
        } else {
            warn!("io lane closed, dropping webhook notification");
            DispatchOutcome::LaneClosed
        }
    }
}

struct DeliveryJob {
    target: String,
    notification: Notification,
    snapshot: NotificationConfig,
    config: Arc<ConfigStore>,
    transport: Arc<dyn WebhookTransport>,
    enrichment: Arc<EnrichmentCache>,
}

impl DeliveryJob {
    async fn run(self) {
        let thumbnail = if self.snapshot.thumbnails_enabled {
            self.thumbnail().await
        } else {
            None
        };

        let embed = self
            .notification
            .embed(&self.snapshot.footer_text, thumbnail);
        let payload = WebhookPayload::single(embed);

        if let Delivery::Delivered | Delivery::DeliveredAfterRetry =
            send_with_retry(self.transport.as_ref(), &self.target, &payload).await
        {
            debug!(entity_id = %self.notification.entity_id, "webhook delivered");
        }
    }

    /// Configured override first, then the enrichment cache. A fresh
    /// resolution is written back to the config.
    async fn thumbnail(&self) -> Option<String> {
        let species = &self.notification.species_id;
        let variant = self.notification.rare_variant;
        let key = normalize_catalog_key(species);

        if let Some(url) = self.snapshot.sprites.get(&key).and_then(|p| p.get(variant)) {
            return Some(url.to_string());
        }

        let url = self.enrichment.lookup(species, variant).await?;
        if let Err(e) = self.config.record_sprite(&key, variant, &url) {
            warn!(key = %key, error = %e, "failed to record resolved sprite");
        }
        Some(url)
    }
}
