//! Telephony Gateway Adapter port

use crate::domain::shared::{AgentId, CallId, PhoneNumber, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceCallRequest {
    pub agent_id: AgentId,
    pub to: PhoneNumber,
    pub from: PhoneNumber,
}

/// Outbound call placement and teardown at the carrier
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TelephonyGateway: Send + Sync {
    /// Ask the carrier to dial; returns the carrier-assigned call id
    ///
    /// A rejection is `CallPlacementFailed` carrying the carrier's reason.
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<CallId>;

    /// Ask the carrier to hang up
    async fn end_call(&self, call_id: &CallId) -> Result<()>;
}
