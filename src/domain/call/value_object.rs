//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an outbound call
///
/// ```text
/// Initiating -> Ringing -> Bridged -> Ending -> Terminated
///      |            \                              ^
///      |             `-----------------------------'
///      `-> Failed  (any non-terminal state may fail)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Placement requested from the carrier, no progress reported yet
    Initiating,
    /// Callee is being alerted, or answered but media not yet attached
    Ringing,
    /// Carrier media stream is attached and the conversation is running
    Bridged,
    /// Hang-up requested; transport is being torn down
    Ending,
    Terminated,
    Failed,
}

impl CallState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &CallState) -> bool {
        use CallState::*;

        match (self, new_state) {
            (Initiating, Ringing) => true,
            (Ringing, Bridged) => true,
            (Ringing, Terminated) => true,
            (Bridged, Ending) => true,
            (Ending, Terminated) => true,

            (from, Failed) => !from.is_terminal(),

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Terminated | CallState::Failed)
    }

    /// Ending or already terminal: no further hang-up is meaningful
    pub fn is_winding_down(&self) -> bool {
        matches!(self, CallState::Ending) || self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Initiating => "Initiating",
            CallState::Ringing => "Ringing",
            CallState::Bridged => "Bridged",
            CallState::Ending => "Ending",
            CallState::Terminated => "Terminated",
            CallState::Failed => "Failed",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call left the active states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Carrier reported normal completion
    Completed,
    /// Hang-up requested through the control API
    HungUp,
    /// Carrier media stream stopped or the socket closed
    TransportClosed,
    NoAnswer,
    Busy,
    Canceled,
    /// Carrier reported the call as failed
    CarrierFailed,
    TransportAttachTimeout,
    BufferOverflow,
    ForceTerminated,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Completed => "completed",
            EndReason::HungUp => "hung_up",
            EndReason::TransportClosed => "transport_closed",
            EndReason::NoAnswer => "no_answer",
            EndReason::Busy => "busy",
            EndReason::Canceled => "canceled",
            EndReason::CarrierFailed => "carrier_failed",
            EndReason::TransportAttachTimeout => "transport_attach_timeout",
            EndReason::BufferOverflow => "buffer_overflow",
            EndReason::ForceTerminated => "force_terminated",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
