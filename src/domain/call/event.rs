//! Call domain events

use crate::domain::call::entity::TranscriptSegment;
use crate::domain::call::value_object::{CallState, EndReason};
use crate::domain::shared::events::EventMetadata;
use crate::domain::shared::value_objects::{AgentId, CallId, PhoneNumber};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInitiated {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub call_id: CallId,
    pub agent_id: AgentId,
    pub callee: PhoneNumber,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStateChanged {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub call_id: CallId,
    pub from: CallState,
    pub to: CallState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptAppended {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub call_id: CallId,
    pub segment: TranscriptSegment,
}

/// Terminal summary, published exactly once per call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub call_id: CallId,
    pub agent_id: AgentId,
    pub final_state: CallState,
    pub end_reason: Option<EndReason>,
    pub transcript: Vec<TranscriptSegment>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// Events emitted by a call session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CallEvent {
    Initiated(CallInitiated),
    StateChanged(CallStateChanged),
    TranscriptAppended(TranscriptAppended),
    Ended(CallSummary),
}

impl CallEvent {
    pub fn call_id(&self) -> &CallId {
        match self {
            CallEvent::Initiated(e) => &e.call_id,
            CallEvent::StateChanged(e) => &e.call_id,
            CallEvent::TranscriptAppended(e) => &e.call_id,
            CallEvent::Ended(e) => &e.call_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            CallEvent::Initiated(_) => "call.initiated",
            CallEvent::StateChanged(_) => "call.state_changed",
            CallEvent::TranscriptAppended(_) => "call.transcript_appended",
            CallEvent::Ended(_) => "call.ended",
        }
    }
}

/// Destination for call events (event stream, audit log, ...)
#[cfg_attr(test, mockall::automock)]
pub trait CallEventSink: Send + Sync {
    fn publish(&self, event: CallEvent);
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl CallEventSink for NullEventSink {
    fn publish(&self, _event: CallEvent) {}
}
