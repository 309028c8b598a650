//! Call Lifecycle Controller
//!
//! Entry point for placing and ending calls and for carrier status
//! callbacks. Every state change goes through the session registry, so a
//! hang-up request racing a carrier callback is applied in whichever order
//! the session lock grants, never both.

use super::pending::PendingCallbacks;
use crate::domain::agent::AgentDirectory;
use crate::domain::call::{CallSession, CallSessionRegistry, CallState, EndReason};
use crate::domain::shared::{AgentId, CallError, CallId, PhoneNumber, Result};
use crate::infrastructure::telemetry;
use crate::infrastructure::telephony::{
    CarrierStatus, PlaceCallRequest, StatusTarget, TelephonyGateway,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Caller ID used when a request does not name one
    pub default_caller: Option<PhoneNumber>,
    /// How long a ringing call may wait for its media stream
    pub attach_timeout: Duration,
    /// How long a call may stay in `Ending` before it is forced to `Terminated`
    pub ending_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            default_caller: None,
            attach_timeout: Duration::from_secs(90),
            ending_timeout: Duration::from_secs(20),
        }
    }
}

/// Result of applying one carrier status callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Applied { from: CallState, to: CallState },
    /// Duplicate or out-of-order status; nothing changed
    Unchanged(CallState),
    /// Session not registered yet; held for replay
    Parked,
    /// Status outside the carrier vocabulary
    Ignored,
}

pub struct CallController {
    registry: Arc<CallSessionRegistry>,
    gateway: Arc<dyn TelephonyGateway>,
    agents: Arc<dyn AgentDirectory>,
    pending: Arc<PendingCallbacks>,
    settings: ControllerSettings,
}

impl CallController {
    pub fn new(
        registry: Arc<CallSessionRegistry>,
        gateway: Arc<dyn TelephonyGateway>,
        agents: Arc<dyn AgentDirectory>,
        pending: Arc<PendingCallbacks>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            registry,
            gateway,
            agents,
            pending,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<CallSessionRegistry> {
        &self.registry
    }

    /// Validate, place the call at the carrier and register its session
    ///
    /// Nothing is registered unless the carrier accepted the call.
    pub async fn initiate_call(
        &self,
        agent_id: &AgentId,
        callee_number: &str,
        caller_number: Option<&str>,
    ) -> Result<CallId> {
        let request = self
            .validate(agent_id, callee_number, caller_number)
            .await
            .inspect_err(|_| telemetry::record_call_rejected("validation"))?;

        let call_id = self
            .gateway
            .place_call(&request)
            .await
            .map_err(|e| match e {
                CallError::CallPlacementFailed(_) => e,
                other => CallError::CallPlacementFailed(other.to_string()),
            })
            .inspect_err(|_| telemetry::record_call_rejected("carrier"))?;

        let session = CallSession::new(
            call_id.clone(),
            request.agent_id.clone(),
            request.to.clone(),
            request.from.clone(),
        );
        self.registry.create(session).await?;
        telemetry::record_call_initiated();
        info!(
            "Call {} placed: agent {} calling {} from {}",
            call_id, request.agent_id, request.to, request.from
        );

        self.replay_parked(&call_id).await;
        Ok(call_id)
    }

    async fn validate(
        &self,
        agent_id: &AgentId,
        callee_number: &str,
        caller_number: Option<&str>,
    ) -> Result<PlaceCallRequest> {
        let to = PhoneNumber::parse(callee_number)?;
        let from = match caller_number.map(str::trim).filter(|c| !c.is_empty()) {
            Some(raw) => PhoneNumber::parse(raw)?,
            None => self.settings.default_caller.clone().ok_or_else(|| {
                CallError::InvalidPhoneNumber("no caller number given or configured".to_string())
            })?,
        };
        if to == from {
            return Err(CallError::InvalidPhoneNumber(format!(
                "{} cannot call itself",
                to
            )));
        }

        if self.agents.resolve(agent_id).await.is_none() {
            return Err(CallError::AgentNotFound(agent_id.to_string()));
        }

        Ok(PlaceCallRequest {
            agent_id: agent_id.clone(),
            to,
            from,
        })
    }

    /// Apply a carrier status callback
    ///
    /// Unknown statuses are ignored; callbacks for calls not yet registered
    /// are parked. `AlreadyTerminal` means the callback arrived after the
    /// call was already ending and changed nothing.
    pub async fn handle_status_callback(
        &self,
        call_id: &CallId,
        raw_status: &str,
    ) -> Result<CallbackOutcome> {
        let Some(status) = CarrierStatus::parse(raw_status) else {
            warn!(
                "Ignoring unknown carrier status {:?} for call {}",
                raw_status, call_id
            );
            return Ok(CallbackOutcome::Ignored);
        };
        telemetry::record_status_callback(status.as_str());
        debug!("Carrier status {} for call {}", status, call_id);

        match self.apply_status(call_id, status).await {
            Err(CallError::CallNotFound(_)) => {
                self.pending.park(call_id, status).await;
                // Registration may have completed while we were parking
                if self.registry.contains(call_id).await {
                    self.replay_parked(call_id).await;
                }
                Ok(CallbackOutcome::Parked)
            }
            other => other,
        }
    }

    async fn apply_status(&self, call_id: &CallId, status: CarrierStatus) -> Result<CallbackOutcome> {
        let outcome = self
            .registry
            .update(call_id, |session| apply_status_to_session(session, status))
            .await?;

        if let CallbackOutcome::Applied { from, to } = outcome {
            info!("Call {} {} -> {} (carrier: {})", call_id, from, to, status);
            self.after_transition(call_id, to);
        }
        Ok(outcome)
    }

    async fn replay_parked(&self, call_id: &CallId) {
        for status in self.pending.take(call_id).await {
            match self.apply_status(call_id, status).await {
                Ok(_) | Err(CallError::AlreadyTerminal(_)) => {}
                Err(e) => warn!(
                    "Replaying {} callback for call {} failed: {}",
                    status, call_id, e
                ),
            }
        }
    }

    /// Hang up a call on behalf of the agent
    ///
    /// A bridged call moves to `Ending` and its media is torn down; a call
    /// that never connected ends immediately. The carrier is asked to hang
    /// up afterwards; a failure there is logged, not retried.
    pub async fn end_call(&self, call_id: &CallId) -> Result<()> {
        let to = self
            .registry
            .update(call_id, |session| {
                let (to, reason) = match session.state() {
                    CallState::Bridged => (CallState::Ending, EndReason::HungUp),
                    CallState::Ringing => (CallState::Terminated, EndReason::Canceled),
                    CallState::Initiating => (CallState::Failed, EndReason::Canceled),
                    CallState::Ending | CallState::Terminated | CallState::Failed => {
                        return Err(CallError::AlreadyTerminal(session.call_id().to_string()));
                    }
                };
                session.transition_to(to, Some(reason))?;
                Ok(to)
            })
            .await?;

        info!("Call {} ending on request ({})", call_id, to);
        self.after_transition(call_id, to);
        self.request_carrier_hangup(call_id).await;
        Ok(())
    }

    /// Administrative termination of a stuck or unwanted call
    pub async fn force_terminate(&self, call_id: &CallId) -> Result<()> {
        self.registry
            .update(call_id, |session| {
                if session.state().is_terminal() {
                    return Err(CallError::AlreadyTerminal(session.call_id().to_string()));
                }
                session.transition_to(CallState::Failed, Some(EndReason::ForceTerminated))
            })
            .await?;

        warn!("Call {} force-terminated", call_id);
        self.request_carrier_hangup(call_id).await;
        Ok(())
    }

    async fn request_carrier_hangup(&self, call_id: &CallId) {
        if let Err(e) = self.gateway.end_call(call_id).await {
            warn!("Carrier hang-up for call {} failed: {}", call_id, e);
        }
    }

    fn after_transition(&self, call_id: &CallId, to: CallState) {
        match to {
            CallState::Ringing => self.watch_attach(call_id.clone()),
            CallState::Ending => self.watch_ending(call_id.clone()),
            _ => {}
        }
    }

    /// Fail the call if no media stream attaches in time
    fn watch_attach(&self, call_id: CallId) {
        let registry = self.registry.clone();
        let gateway = self.gateway.clone();
        let timeout = self.settings.attach_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let timed_out = registry
                .update(&call_id, |session| {
                    if session.state() != CallState::Ringing {
                        return Ok(false);
                    }
                    session.transition_to(CallState::Failed, Some(EndReason::TransportAttachTimeout))?;
                    Ok(true)
                })
                .await;

            if let Ok(true) = timed_out {
                warn!("{}", CallError::TransportAttachTimeout(call_id.to_string()));
                if let Err(e) = gateway.end_call(&call_id).await {
                    warn!("Carrier hang-up for call {} failed: {}", call_id, e);
                }
            }
        });
    }

    /// Complete teardown if the media side never reports back
    fn watch_ending(&self, call_id: CallId) {
        let registry = self.registry.clone();
        let timeout = self.settings.ending_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;

            let forced = registry
                .update(&call_id, |session| {
                    if session.state() != CallState::Ending {
                        return Ok(false);
                    }
                    session.transition_to(CallState::Terminated, None)?;
                    Ok(true)
                })
                .await;

            if let Ok(true) = forced {
                warn!("Call {} stuck in Ending, marked Terminated", call_id);
            }
        });
    }
}

/// Carrier status to state change, given the session's current state
fn apply_status_to_session(session: &mut CallSession, status: CarrierStatus) -> Result<CallbackOutcome> {
    let from = session.state();
    let target = status.target();

    let (to, reason) = match (target, from) {
        (StatusTarget::Ringing, CallState::Initiating) => (CallState::Ringing, None),
        (StatusTarget::Ringing, _) => return Ok(CallbackOutcome::Unchanged(from)),

        (StatusTarget::Answered, _) => {
            session.mark_answered();
            if from != CallState::Initiating {
                return Ok(CallbackOutcome::Unchanged(from));
            }
            (CallState::Ringing, None)
        }

        (_, CallState::Ending | CallState::Terminated | CallState::Failed) => {
            return Err(CallError::AlreadyTerminal(session.call_id().to_string()));
        }

        (StatusTarget::Ended(reason), CallState::Initiating) => (CallState::Failed, Some(reason)),
        (StatusTarget::Ended(reason), CallState::Ringing) => (CallState::Terminated, Some(reason)),
        (StatusTarget::Ended(reason), CallState::Bridged) => (CallState::Ending, Some(reason)),
        (StatusTarget::Failed(reason), _) => (CallState::Failed, Some(reason)),
    };

    session.transition_to(to, reason)?;
    Ok(CallbackOutcome::Applied { from, to })
}
