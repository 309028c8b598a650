//! Carrier media stream WebSocket endpoint
//!
//! The carrier opens one socket per answered call and sends `connected`,
//! then `start` naming the call, then media. Once `start` arrives the
//! socket is handed to the audio bridge as the call's transport.

use super::state::AppState;
use crate::domain::shared::{CallError, CallId, Result};
use crate::infrastructure::media::protocol::{InboundMessage, OutboundMessage};
use crate::infrastructure::media::{MediaSink, MediaSource, MediaTransport, StreamEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

/// WebSocket upgrade for carrier media
pub async fn media_stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_media_socket(socket, state))
}

async fn handle_media_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let started = tokio::time::timeout(state.webhooks.start_timeout, wait_for_start(&mut receiver)).await;
    let (call_id, stream_sid) = match started {
        Ok(Some(start)) => start,
        Ok(None) => {
            debug!("Media stream closed before start");
            return;
        }
        Err(_) => {
            warn!("Media stream sent no start message, closing");
            let _ = sender.close().await;
            return;
        }
    };

    let transport = MediaTransport {
        stream_sid: stream_sid.clone(),
        source: Box::new(WebSocketSource {
            receiver,
            stream_sid: stream_sid.clone(),
        }),
        sink: Box::new(WebSocketSink { sender: Some(sender) }),
    };

    match state.bridge.attach(&call_id, transport).await {
        Ok(handle) => {
            if let Err(e) = handle.await {
                warn!("Media loop for call {} ended abnormally: {}", call_id, e);
            }
            info!("Media stream {} for call {} finished", stream_sid, call_id);
        }
        Err(e) => {
            // The transport, and with it the socket, is dropped here.
            warn!("Media stream {} refused for call {}: {}", stream_sid, call_id, e);
        }
    }
}

/// Read until `start`; returns the call id and stream sid
async fn wait_for_start(receiver: &mut SplitStream<WebSocket>) -> Option<(CallId, String)> {
    while let Some(message) = receiver.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        };
        match InboundMessage::parse(&text) {
            Ok(InboundMessage::Connected { protocol }) => {
                debug!("Media stream connected ({})", protocol.as_deref().unwrap_or("unknown"));
            }
            Ok(InboundMessage::Start { stream_sid, start }) => {
                info!("Media stream {} started for call {}", stream_sid, start.call_sid);
                return Some((CallId::new(start.call_sid), stream_sid));
            }
            Ok(other) => debug!("Ignoring {:?} before start", other),
            Err(e) => warn!("Unreadable media stream message: {}", e),
        }
    }
    None
}

struct WebSocketSource {
    receiver: SplitStream<WebSocket>,
    stream_sid: String,
}

#[async_trait::async_trait]
impl MediaSource for WebSocketSource {
    async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        loop {
            let text = match self.receiver.next().await? {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => return Some(Err(CallError::Transport(e.to_string()))),
            };

            match InboundMessage::parse(&text) {
                Ok(InboundMessage::Media { media, .. }) => {
                    if !media.is_inbound() {
                        continue;
                    }
                    match media.to_frame() {
                        Ok(frame) => return Some(Ok(StreamEvent::Media(frame))),
                        Err(e) => warn!("Dropping bad frame on stream {}: {}", self.stream_sid, e),
                    }
                }
                Ok(InboundMessage::Mark { mark }) => return Some(Ok(StreamEvent::Mark(mark.name))),
                Ok(InboundMessage::Dtmf { dtmf }) => return Some(Ok(StreamEvent::Dtmf(dtmf.digit))),
                Ok(InboundMessage::Stop {}) => return Some(Ok(StreamEvent::Stop)),
                Ok(InboundMessage::Connected { .. } | InboundMessage::Start { .. }) => {}
                Err(e) => warn!("Unreadable message on stream {}: {}", self.stream_sid, e),
            }
        }
    }
}

struct WebSocketSink {
    sender: Option<SplitSink<WebSocket, Message>>,
}

#[async_trait::async_trait]
impl MediaSink for WebSocketSink {
    async fn send(&mut self, message: OutboundMessage) -> Result<()> {
        let sender = self
            .sender
            .as_mut()
            .ok_or_else(|| CallError::Transport("media stream closed".to_string()))?;
        let json = message.to_json()?;
        sender
            .send(Message::Text(json))
            .await
            .map_err(|e| CallError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut sender) = self.sender.take() {
            let _ = sender.close().await;
        }
    }
}
