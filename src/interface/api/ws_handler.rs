//! WebSocket call event streaming handler

use crate::domain::call::{CallEvent, CallEventSink};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Fans call events out to every connected WebSocket client
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<CallEvent>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl CallEventSink for EventBroadcaster {
    fn publish(&self, event: CallEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    /// Only stream events of this call
    pub call_id: Option<String>,
}

/// WebSocket handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(filter): Query<EventFilter>,
    State(broadcaster): State<Arc<EventBroadcaster>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, broadcaster, filter))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<EventBroadcaster>, filter: EventFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = broadcaster.subscribe();

    info!("WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagging, skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if let Some(call_id) = &filter.call_id {
                if event.call_id().as_str() != call_id {
                    continue;
                }
            }

            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        debug!("Failed to send event to WebSocket client");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize event: {}", e);
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                debug!("Received close message");
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::event::CallStateChanged;
    use crate::domain::call::CallState;
    use crate::domain::shared::{CallId, EventMetadata};

    #[tokio::test]
    async fn test_broadcast_to_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.publish(CallEvent::StateChanged(CallStateChanged {
            metadata: EventMetadata::now(),
            call_id: CallId::new("CA1"),
            from: CallState::Ringing,
            to: CallState::Bridged,
        }));

        let event = rx.recv().await.unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["data"]["callId"], "CA1");
        assert_eq!(json["data"]["to"], "Bridged");
    }
}
