use crate::collaborators::RealtimeBroadcaster;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events pushed to the real-time transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RealtimeEvent {
    #[serde(rename = "auction_room")]
    AuctionRoom {
        auction_id: Uuid,
        event_type: String,
        payload: Value,
        timestamp: i64,
    },
    #[serde(rename = "user")]
    User {
        user_id: Uuid,
        event_type: String,
        payload: Value,
        timestamp: i64,
    },
}

/// In-process broadcaster over a `tokio::sync::broadcast` channel.
///
/// The transport that fans events out to clients (WebSocket gateway etc.)
/// subscribes via [`ChannelBroadcaster::subscribe`]; this service only
/// publishes.
pub struct ChannelBroadcaster {
    tx: broadcast::Sender<RealtimeEvent>,
}

impl ChannelBroadcaster {
    /// Create a new broadcaster buffering up to `capacity` events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: RealtimeEvent) {
        // send errors only mean there are currently no subscribers
        if self.tx.send(event).is_err() {
            tracing::trace!("no realtime subscribers connected");
        }
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl RealtimeBroadcaster for ChannelBroadcaster {
    async fn emit_to_auction_room(&self, auction_id: Uuid, event_type: &str, payload: Value) {
        self.publish(RealtimeEvent::AuctionRoom {
            auction_id,
            event_type: event_type.to_string(),
            payload,
            timestamp: chrono::Utc::now().timestamp(),
        });
    }

    async fn emit_to_user(&self, user_id: Uuid, event_type: &str, payload: Value) {
        self.publish(RealtimeEvent::User {
            user_id,
            event_type: event_type.to_string(),
            payload,
            timestamp: chrono::Utc::now().timestamp(),
        });
    }
}
