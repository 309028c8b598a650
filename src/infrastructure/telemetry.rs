//! Call metrics

use crate::domain::call::{CallState, EndReason};
use metrics::{counter, describe_counter, describe_gauge, gauge};

pub fn describe_metrics() {
    describe_counter!("calls_initiated_total", "Outbound calls accepted by the carrier");
    describe_counter!("calls_rejected_total", "Outbound calls rejected before or at placement");
    describe_counter!("calls_completed_total", "Calls that reached Terminated");
    describe_counter!("calls_failed_total", "Calls that reached Failed, by reason");
    describe_gauge!("active_calls", "Call sessions not yet terminal");
    describe_counter!("status_callbacks_total", "Carrier status callbacks received, by status");
    describe_counter!("bridges_attached_total", "Carrier media streams attached to a call");
    describe_counter!("inbound_frames_dropped_total", "Caller audio frames dropped on overflow");
    describe_counter!("synthesis_failures_total", "Agent turns whose audio could not be synthesized");
    describe_counter!("transcription_failures_total", "Caller utterances that could not be transcribed");
}

pub fn record_call_initiated() {
    counter!("calls_initiated_total").increment(1);
}

pub fn record_call_rejected(reason: &'static str) {
    counter!("calls_rejected_total", "reason" => reason).increment(1);
}

pub fn record_call_finished(state: CallState, reason: Option<EndReason>) {
    match state {
        CallState::Terminated => counter!("calls_completed_total").increment(1),
        CallState::Failed => {
            let reason = reason.map_or("unknown", |r| r.as_str());
            counter!("calls_failed_total", "reason" => reason).increment(1);
        }
        _ => {}
    }
}

pub fn set_active_calls(count: usize) {
    gauge!("active_calls").set(count as f64);
}

pub fn record_status_callback(status: &'static str) {
    counter!("status_callbacks_total", "status" => status).increment(1);
}

pub fn record_bridge_attached() {
    counter!("bridges_attached_total").increment(1);
}

pub fn record_inbound_frames_dropped(count: u64) {
    counter!("inbound_frames_dropped_total").increment(count);
}

pub fn record_synthesis_failure() {
    counter!("synthesis_failures_total").increment(1);
}

pub fn record_transcription_failure() {
    counter!("transcription_failures_total").increment(1);
}
