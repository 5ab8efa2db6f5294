use crate::collaborators::WebhookDispatcher;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

const DELIVERY_ATTEMPTS: u32 = 3;

/// A queued webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub event_type: String,
    pub payload: Value,
    pub enqueued_at: i64,
}

/// Webhook dispatcher backed by an in-process queue and a background
/// delivery worker. Enqueueing never blocks on network I/O; delivery
/// failures are logged and retried, then dropped (the downstream consumer
/// is expected to reconcile via its own at-least-once contract).
pub struct HttpWebhookDispatcher {
    tx: mpsc::UnboundedSender<WebhookEvent>,
}

impl HttpWebhookDispatcher {
    /// Create the dispatcher and spawn its delivery worker. With no
    /// endpoint configured, events are consumed and logged only.
    pub fn spawn(endpoint: Option<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(delivery_worker(endpoint, rx));
        Self { tx }
    }
}

async fn delivery_worker(endpoint: Option<String>, mut rx: mpsc::UnboundedReceiver<WebhookEvent>) {
    let client = Client::new();
    while let Some(event) = rx.recv().await {
        let Some(url) = endpoint.as_deref() else {
            debug!("webhook {} ({}) dropped: no endpoint configured", event.id, event.event_type);
            continue;
        };
        for attempt in 1..=DELIVERY_ATTEMPTS {
            let result = client
                .post(url)
                .json(&event)
                .timeout(Duration::from_secs(5))
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match result {
                Ok(_) => {
                    debug!("webhook {} ({}) delivered", event.id, event.event_type);
                    break;
                }
                Err(e) if attempt < DELIVERY_ATTEMPTS => {
                    warn!(
                        "webhook {} delivery attempt {} failed: {}",
                        event.id, attempt, e
                    );
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                Err(e) => {
                    warn!(
                        "webhook {} ({}) dropped after {} attempts: {}",
                        event.id, event.event_type, DELIVERY_ATTEMPTS, e
                    );
                }
            }
        }
    }
}

#[async_trait]
impl WebhookDispatcher for HttpWebhookDispatcher {
    async fn enqueue_webhook(&self, event_type: &str, payload: Value) -> AppResult<()> {
        let event = WebhookEvent {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            payload,
            enqueued_at: chrono::Utc::now().timestamp(),
        };
        self.tx
            .send(event)
            .map_err(|_| AppError::ExternalService("Webhook queue closed".to_string()))
    }
}
