//! Call event fan-out with logging and metrics

use crate::domain::call::{CallEvent, CallEventSink};
use crate::infrastructure::telemetry;
use std::sync::Arc;
use tracing::{debug, info};

/// Logs and counts call events before handing them to the next sink
pub struct InstrumentedSink {
    inner: Arc<dyn CallEventSink>,
}

impl InstrumentedSink {
    pub fn new(inner: Arc<dyn CallEventSink>) -> Self {
        Self { inner }
    }
}

impl CallEventSink for InstrumentedSink {
    fn publish(&self, event: CallEvent) {
        match &event {
            CallEvent::Ended(summary) => {
                let reason = summary.end_reason.map_or("none", |r| r.as_str());
                info!(
                    "Call {} finished {} (reason: {}, {} transcript segments)",
                    summary.call_id,
                    summary.final_state,
                    reason,
                    summary.transcript.len()
                );
                telemetry::record_call_finished(summary.final_state, summary.end_reason);
            }
            other => debug!("{} for call {}", other.event_type(), other.call_id()),
        }
        self.inner.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::event::{CallStateChanged, MockCallEventSink};
    use crate::domain::call::CallState;
    use crate::domain::shared::{CallId, EventMetadata};

    #[test]
    fn test_forwards_every_event() {
        let mut inner = MockCallEventSink::new();
        inner
            .expect_publish()
            .withf(|event| event.event_type() == "call.state_changed")
            .times(1)
            .return_const(());

        let sink = InstrumentedSink::new(Arc::new(inner));
        sink.publish(CallEvent::StateChanged(CallStateChanged {
            metadata: EventMetadata::now(),
            call_id: CallId::new("CA1"),
            from: CallState::Initiating,
            to: CallState::Ringing,
        }));
    }
}
