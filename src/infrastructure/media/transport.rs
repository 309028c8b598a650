//! Carrier media transport
//!
//! A transport is split into a source (carrier to us) and a sink (us to
//! carrier) so the reader and writer loops can own one half each.

use super::frame::MediaFrame;
use super::protocol::OutboundMessage;
use crate::domain::shared::{CallError, Result};
use tokio::sync::mpsc;

/// Decoded carrier stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Media(MediaFrame),
    /// A mark we sent has been played out
    Mark(String),
    Dtmf(String),
    /// Carrier ended the stream
    Stop,
}

#[async_trait::async_trait]
pub trait MediaSource: Send {
    /// Next event; `None` when the connection is gone
    async fn next_event(&mut self) -> Option<Result<StreamEvent>>;
}

#[async_trait::async_trait]
pub trait MediaSink: Send {
    async fn send(&mut self, message: OutboundMessage) -> Result<()>;

    async fn close(&mut self);
}

/// Both halves of one attached carrier stream
pub struct MediaTransport {
    pub stream_sid: String,
    pub source: Box<dyn MediaSource>,
    pub sink: Box<dyn MediaSink>,
}

/// In-process transport backed by channels
///
/// Used for loopback testing and for driving a bridge without a carrier.
pub struct ChannelTransport;

/// The carrier's side of a [`ChannelTransport`]
pub struct CarrierEnd {
    pub events: mpsc::Sender<Result<StreamEvent>>,
    pub sent: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl CarrierEnd {
    pub async fn send_media(&self, payload: bytes::Bytes) -> Result<()> {
        self.events
            .send(Ok(StreamEvent::Media(MediaFrame::new(payload))))
            .await
            .map_err(|_| CallError::Transport("bridge side closed".to_string()))
    }

    pub async fn stop(&self) -> Result<()> {
        self.events
            .send(Ok(StreamEvent::Stop))
            .await
            .map_err(|_| CallError::Transport("bridge side closed".to_string()))
    }
}

impl ChannelTransport {
    pub fn pair(stream_sid: impl Into<String>, capacity: usize) -> (MediaTransport, CarrierEnd) {
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        let transport = MediaTransport {
            stream_sid: stream_sid.into(),
            source: Box::new(ChannelSource { events: events_rx }),
            sink: Box::new(ChannelSink {
                sent: Some(sent_tx),
            }),
        };
        let carrier = CarrierEnd {
            events: events_tx,
            sent: sent_rx,
        };
        (transport, carrier)
    }
}

struct ChannelSource {
    events: mpsc::Receiver<Result<StreamEvent>>,
}

#[async_trait::async_trait]
impl MediaSource for ChannelSource {
    async fn next_event(&mut self) -> Option<Result<StreamEvent>> {
        self.events.recv().await
    }
}

struct ChannelSink {
    sent: Option<mpsc::UnboundedSender<OutboundMessage>>,
}

#[async_trait::async_trait]
impl MediaSink for ChannelSink {
    async fn send(&mut self, message: OutboundMessage) -> Result<()> {
        let sent = self
            .sent
            .as_ref()
            .ok_or_else(|| CallError::Transport("sink closed".to_string()))?;
        sent.send(message)
            .map_err(|_| CallError::Transport("carrier side closed".to_string()))
    }

    async fn close(&mut self) {
        self.sent = None;
    }
}
