//! Carrier call status vocabulary
//!
//! The only place carrier status strings are interpreted.

use crate::domain::call::EndReason;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarrierStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Busy,
    NoAnswer,
    Failed,
    Canceled,
}

/// What a carrier status means for the call lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTarget {
    /// Callee is being alerted
    Ringing,
    /// Callee picked up; media attach will bridge the call
    Answered,
    /// Call is over without carrier-side failure
    Ended(EndReason),
    /// Carrier could not complete the call
    Failed(EndReason),
}

impl CarrierStatus {
    /// Parse a status as sent in carrier callbacks; `None` for unknown values
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        let status = match normalized.as_str() {
            "queued" => CarrierStatus::Queued,
            "initiated" => CarrierStatus::Initiated,
            "ringing" => CarrierStatus::Ringing,
            "in-progress" | "answered" => CarrierStatus::InProgress,
            "completed" => CarrierStatus::Completed,
            "busy" => CarrierStatus::Busy,
            "no-answer" => CarrierStatus::NoAnswer,
            "failed" => CarrierStatus::Failed,
            "canceled" | "cancelled" => CarrierStatus::Canceled,
            _ => return None,
        };
        Some(status)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierStatus::Queued => "queued",
            CarrierStatus::Initiated => "initiated",
            CarrierStatus::Ringing => "ringing",
            CarrierStatus::InProgress => "in-progress",
            CarrierStatus::Completed => "completed",
            CarrierStatus::Busy => "busy",
            CarrierStatus::NoAnswer => "no-answer",
            CarrierStatus::Failed => "failed",
            CarrierStatus::Canceled => "canceled",
        }
    }

    pub fn target(&self) -> StatusTarget {
        match self {
            CarrierStatus::Queued | CarrierStatus::Initiated | CarrierStatus::Ringing => {
                StatusTarget::Ringing
            }
            CarrierStatus::InProgress => StatusTarget::Answered,
            CarrierStatus::Completed => StatusTarget::Ended(EndReason::Completed),
            CarrierStatus::Busy => StatusTarget::Ended(EndReason::Busy),
            CarrierStatus::NoAnswer => StatusTarget::Ended(EndReason::NoAnswer),
            CarrierStatus::Canceled => StatusTarget::Ended(EndReason::Canceled),
            CarrierStatus::Failed => StatusTarget::Failed(EndReason::CarrierFailed),
        }
    }
}

impl fmt::Display for CarrierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
