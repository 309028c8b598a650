//! Domain errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::call::CallState;

/// Coarse error taxonomy used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Rejected before any side effect
    Validation,
    /// An upstream service is down or slow; the call degrades
    UpstreamUnavailable,
    /// The operation does not fit the current call state
    StateConflict,
    /// A bounded resource ran out; the affected session fails
    ResourceExhaustion,
    Internal,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Call placement failed: {0}")]
    CallPlacementFailed(String),

    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Call {0} is already ending or terminated")]
    AlreadyTerminal(String),

    #[error("No attachable session for call {0}")]
    SessionNotFound(String),

    #[error("Call {0} is already registered")]
    DuplicateCallId(String),

    #[error("Illegal transition for call {call_id}: {from} -> {to}")]
    IllegalTransition {
        call_id: String,
        from: CallState,
        to: CallState,
    },

    #[error("Speech synthesis unavailable: {0}")]
    SynthesisUnavailable(String),

    #[error("Transcription unavailable: {0}")]
    TranscriptionUnavailable(String),

    #[error("Media transport did not attach in time for call {0}")]
    TransportAttachTimeout(String),

    #[error("Out-of-order frame: expected sequence {expected}, got {got}")]
    OutOfOrderFrame { expected: u64, got: u64 },

    #[error("Buffer overflow: {0}")]
    BufferOverflow(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CallError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CallError::InvalidPhoneNumber(_) | CallError::AgentNotFound(_) => ErrorClass::Validation,
            CallError::CallPlacementFailed(_)
            | CallError::SynthesisUnavailable(_)
            | CallError::TranscriptionUnavailable(_)
            | CallError::Transport(_) => ErrorClass::UpstreamUnavailable,
            CallError::CallNotFound(_)
            | CallError::AlreadyTerminal(_)
            | CallError::SessionNotFound(_)
            | CallError::DuplicateCallId(_)
            | CallError::IllegalTransition { .. }
            | CallError::OutOfOrderFrame { .. } => ErrorClass::StateConflict,
            CallError::TransportAttachTimeout(_) | CallError::BufferOverflow(_) => {
                ErrorClass::ResourceExhaustion
            }
            CallError::Internal(_) => ErrorClass::Internal,
        }
    }
}
