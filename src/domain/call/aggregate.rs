//! Call session aggregate root

use crate::domain::call::entity::TranscriptSegment;
use crate::domain::call::event::{
    CallEvent, CallInitiated, CallStateChanged, CallSummary, TranscriptAppended,
};
use crate::domain::call::value_object::{CallState, EndReason};
use crate::domain::shared::error::CallError;
use crate::domain::shared::events::EventMetadata;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{AgentId, CallId, PhoneNumber};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Live carrier media connection owned by a bridged call
///
/// Cancelling the token stops every loop serving the connection.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    stream_sid: String,
    cancel: CancellationToken,
    attached_at: DateTime<Utc>,
}

impl TransportHandle {
    pub fn new(stream_sid: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            stream_sid: stream_sid.into(),
            cancel,
            attached_at: Utc::now(),
        }
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn attached_at(&self) -> DateTime<Utc> {
        self.attached_at
    }
}

/// In-flight speech synthesis request
#[derive(Debug, Clone)]
pub struct SynthesisHandle {
    request_id: u64,
    cancel: CancellationToken,
}

impl SynthesisHandle {
    pub fn new(request_id: u64, cancel: CancellationToken) -> Self {
        Self { request_id, cancel }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Point-in-time copy of a session, safe to hand out of the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub call_id: CallId,
    pub agent_id: AgentId,
    pub callee: PhoneNumber,
    pub caller: PhoneNumber,
    pub state: CallState,
    pub end_reason: Option<EndReason>,
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stream_sid: Option<String>,
    pub synthesis_active: bool,
    pub transcript: Vec<TranscriptSegment>,
}

impl CallSnapshot {
    pub fn has_transport(&self) -> bool {
        self.stream_sid.is_some()
    }

    pub fn duration_secs(&self) -> i64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_seconds().max(0)
    }
}

/// Call session aggregate root
///
/// Owns everything that lives exactly as long as one outbound call: its
/// state, the carrier media connection, the current synthesis request and
/// the transcript. All mutation goes through methods that keep these
/// consistent:
///
/// - a transport is held if and only if the call is `Bridged`
/// - at most one synthesis request is in flight
/// - `ended_at` is set once, when a terminal state is reached
#[derive(Debug)]
pub struct CallSession {
    call_id: CallId,
    agent_id: AgentId,
    callee: PhoneNumber,
    caller: PhoneNumber,
    state: CallState,
    end_reason: Option<EndReason>,
    started_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    audio_socket: Option<TransportHandle>,
    pending_synthesis: Option<SynthesisHandle>,
    transcript: Vec<TranscriptSegment>,
    events: Vec<CallEvent>,
}

impl CallSession {
    pub fn new(call_id: CallId, agent_id: AgentId, callee: PhoneNumber, caller: PhoneNumber) -> Self {
        let mut session = Self {
            call_id: call_id.clone(),
            agent_id: agent_id.clone(),
            callee: callee.clone(),
            caller,
            state: CallState::Initiating,
            end_reason: None,
            started_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            audio_socket: None,
            pending_synthesis: None,
            transcript: Vec::new(),
            events: Vec::new(),
        };

        session.record_event(CallEvent::Initiated(CallInitiated {
            metadata: EventMetadata::now(),
            call_id,
            agent_id,
            callee,
        }));

        session
    }

    /// Move to a new state
    ///
    /// `Bridged` can only be entered through [`CallSession::attach_transport`].
    /// Leaving `Bridged` releases the transport; leaving it or failing
    /// cancels any pending synthesis. The first end reason given sticks.
    pub fn transition_to(&mut self, new_state: CallState, reason: Option<EndReason>) -> Result<()> {
        if new_state == CallState::Bridged {
            return Err(self.illegal(new_state));
        }
        self.apply_transition(new_state, reason)
    }

    /// Attach the carrier media connection and enter `Bridged`
    ///
    /// A session still in `Initiating` passes through `Ringing` first; the
    /// media stream can beat the carrier's ringing callback.
    pub fn attach_transport(&mut self, handle: TransportHandle) -> Result<()> {
        match self.state {
            CallState::Initiating => self.apply_transition(CallState::Ringing, None)?,
            CallState::Ringing => {}
            _ => return Err(CallError::SessionNotFound(self.call_id.to_string())),
        }

        self.apply_transition(CallState::Bridged, None)?;
        self.audio_socket = Some(handle);
        Ok(())
    }

    fn apply_transition(&mut self, new_state: CallState, reason: Option<EndReason>) -> Result<()> {
        if !self.state.can_transition_to(&new_state) {
            return Err(self.illegal(new_state));
        }

        let from = self.state;
        self.state = new_state;

        if from == CallState::Bridged {
            if let Some(transport) = self.audio_socket.take() {
                transport.cancel.cancel();
            }
        }
        if new_state != CallState::Bridged {
            self.cancel_synthesis();
        }
        if self.end_reason.is_none() {
            self.end_reason = reason;
        }

        self.record_event(CallEvent::StateChanged(CallStateChanged {
            metadata: EventMetadata::now(),
            call_id: self.call_id.clone(),
            from,
            to: new_state,
        }));

        if new_state.is_terminal() {
            let ended_at = Utc::now();
            self.ended_at = Some(ended_at);
            let summary = self.summary(ended_at);
            self.record_event(CallEvent::Ended(summary));
        }

        Ok(())
    }

    fn illegal(&self, to: CallState) -> CallError {
        CallError::IllegalTransition {
            call_id: self.call_id.to_string(),
            from: self.state,
            to,
        }
    }

    /// Record that the carrier reported the callee picked up
    ///
    /// Returns `false` when already recorded.
    pub fn mark_answered(&mut self) -> bool {
        if self.answered_at.is_some() {
            return false;
        }
        self.answered_at = Some(Utc::now());
        true
    }

    /// Register a new synthesis request, cancelling any unfinished one
    pub fn begin_synthesis(&mut self, handle: SynthesisHandle) -> Result<()> {
        if self.state != CallState::Bridged {
            return Err(CallError::AlreadyTerminal(self.call_id.to_string()));
        }
        if let Some(previous) = self.pending_synthesis.replace(handle) {
            previous.cancel.cancel();
        }
        Ok(())
    }

    /// Clear the pending synthesis if it is still the given request
    pub fn finish_synthesis(&mut self, request_id: u64) {
        if self
            .pending_synthesis
            .as_ref()
            .is_some_and(|pending| pending.request_id == request_id)
        {
            self.pending_synthesis = None;
        }
    }

    /// Returns `true` if a request was in flight
    pub fn cancel_synthesis(&mut self) -> bool {
        match self.pending_synthesis.take() {
            Some(pending) => {
                pending.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Append to the transcript
    ///
    /// Accepted while bridged, and while ending so a partial utterance can
    /// be flushed during teardown.
    pub fn append_transcript(&mut self, segment: TranscriptSegment) -> Result<()> {
        if !matches!(self.state, CallState::Bridged | CallState::Ending) {
            return Err(CallError::AlreadyTerminal(self.call_id.to_string()));
        }

        self.transcript.push(segment.clone());
        self.record_event(CallEvent::TranscriptAppended(TranscriptAppended {
            metadata: EventMetadata::now(),
            call_id: self.call_id.clone(),
            segment,
        }));
        Ok(())
    }

    /// Terminal and past the grace period
    pub fn is_expired(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        let Ok(grace) = ChronoDuration::from_std(grace) else {
            return false;
        };
        match self.ended_at {
            Some(ended_at) if self.state.is_terminal() => ended_at
                .checked_add_signed(grace)
                .is_some_and(|deadline| deadline <= now),
            _ => false,
        }
    }

    fn summary(&self, ended_at: DateTime<Utc>) -> CallSummary {
        CallSummary {
            metadata: EventMetadata::now(),
            call_id: self.call_id.clone(),
            agent_id: self.agent_id.clone(),
            final_state: self.state,
            end_reason: self.end_reason,
            transcript: self.transcript.clone(),
            started_at: self.started_at,
            ended_at,
        }
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            call_id: self.call_id.clone(),
            agent_id: self.agent_id.clone(),
            callee: self.callee.clone(),
            caller: self.caller.clone(),
            state: self.state,
            end_reason: self.end_reason,
            started_at: self.started_at,
            answered_at: self.answered_at,
            ended_at: self.ended_at,
            stream_sid: self.audio_socket.as_ref().map(|t| t.stream_sid.clone()),
            synthesis_active: self.pending_synthesis.is_some(),
            transcript: self.transcript.clone(),
        }
    }

    fn record_event(&mut self, event: CallEvent) {
        self.events.push(event);
    }

    /// Take all pending events
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.events)
    }

    // Getters
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn callee(&self) -> &PhoneNumber {
        &self.callee
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn audio_socket(&self) -> Option<&TransportHandle> {
        self.audio_socket.as_ref()
    }

    pub fn pending_synthesis(&self) -> Option<&SynthesisHandle> {
        self.pending_synthesis.as_ref()
    }

    pub fn transcript(&self) -> &[TranscriptSegment] {
        &self.transcript
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> CallSession {
        CallSession::new(
            CallId::new("CA100"),
            AgentId::new("agent-1"),
            PhoneNumber::parse("+14155550123").unwrap(),
            PhoneNumber::parse("+15302886523").unwrap(),
        )
    }

    fn bridged_session() -> (CallSession, CancellationToken) {
        let mut session = new_session();
        let token = CancellationToken::new();
        session
            .attach_transport(TransportHandle::new("MZ1", token.clone()))
            .unwrap();
        (session, token)
    }

    #[test]
    fn test_new_session() {
        let mut session = new_session();
        assert_eq!(session.state(), CallState::Initiating);
        assert!(session.audio_socket().is_none());
        assert!(session.ended_at().is_none());

        let events = session.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], CallEvent::Initiated(_)));
    }

    #[test]
    fn test_cannot_bridge_without_transport() {
        let mut session = new_session();
        session.transition_to(CallState::Ringing, None).unwrap();
        let result = session.transition_to(CallState::Bridged, None);
        assert!(matches!(result, Err(CallError::IllegalTransition { .. })));
        assert_eq!(session.state(), CallState::Ringing);
    }

    #[test]
    fn test_attach_from_initiating_passes_through_ringing() {
        let (mut session, _token) = bridged_session();
        assert_eq!(session.state(), CallState::Bridged);
        assert_eq!(session.audio_socket().unwrap().stream_sid(), "MZ1");

        let states: Vec<CallState> = session
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                CallEvent::StateChanged(change) => Some(change.to),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![CallState::Ringing, CallState::Bridged]);
    }

    #[test]
    fn test_attach_rejected_after_bridge() {
        let (mut session, _token) = bridged_session();
        let result = session.attach_transport(TransportHandle::new("MZ2", CancellationToken::new()));
        assert!(matches!(result, Err(CallError::SessionNotFound(_))));
        assert_eq!(session.audio_socket().unwrap().stream_sid(), "MZ1");
    }

    #[test]
    fn test_leaving_bridged_releases_transport() {
        let (mut session, token) = bridged_session();
        session
            .transition_to(CallState::Ending, Some(EndReason::HungUp))
            .unwrap();

        assert!(session.audio_socket().is_none());
        assert!(token.is_cancelled());
        assert_eq!(session.end_reason(), Some(EndReason::HungUp));
    }

    #[test]
    fn test_failure_from_bridged_releases_transport_and_synthesis() {
        let (mut session, token) = bridged_session();
        let synth_token = CancellationToken::new();
        session
            .begin_synthesis(SynthesisHandle::new(1, synth_token.clone()))
            .unwrap();

        session
            .transition_to(CallState::Failed, Some(EndReason::BufferOverflow))
            .unwrap();

        assert!(token.is_cancelled());
        assert!(synth_token.is_cancelled());
        assert!(session.pending_synthesis().is_none());
        assert!(session.ended_at().is_some());
    }

    #[test]
    fn test_new_synthesis_cancels_previous() {
        let (mut session, _token) = bridged_session();
        let first = CancellationToken::new();
        let second = CancellationToken::new();

        session.begin_synthesis(SynthesisHandle::new(1, first.clone())).unwrap();
        session.begin_synthesis(SynthesisHandle::new(2, second.clone())).unwrap();

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(session.pending_synthesis().unwrap().request_id(), 2);

        session.finish_synthesis(1);
        assert!(session.pending_synthesis().is_some());
        session.finish_synthesis(2);
        assert!(session.pending_synthesis().is_none());
    }

    #[test]
    fn test_synthesis_requires_bridge() {
        let mut session = new_session();
        let result = session.begin_synthesis(SynthesisHandle::new(1, CancellationToken::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_terminal_emits_summary_once() {
        let (mut session, _token) = bridged_session();
        session
            .append_transcript(TranscriptSegment::agent("Hello, this is Ava."))
            .unwrap();
        session.take_events();

        session.transition_to(CallState::Ending, Some(EndReason::HungUp)).unwrap();
        session.transition_to(CallState::Terminated, None).unwrap();
        let ended_at = session.ended_at();
        assert!(session.transition_to(CallState::Failed, None).is_err());
        assert_eq!(session.ended_at(), ended_at);

        let summaries: Vec<CallSummary> = session
            .take_events()
            .into_iter()
            .filter_map(|e| match e {
                CallEvent::Ended(summary) => Some(summary),
                _ => None,
            })
            .collect();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].final_state, CallState::Terminated);
        assert_eq!(summaries[0].end_reason, Some(EndReason::HungUp));
        assert_eq!(summaries[0].transcript.len(), 1);
    }

    #[test]
    fn test_transcript_rejected_when_terminal() {
        let mut session = new_session();
        session.transition_to(CallState::Failed, Some(EndReason::CarrierFailed)).unwrap();
        assert!(session
            .append_transcript(TranscriptSegment::caller("hello"))
            .is_err());
    }

    #[test]
    fn test_expiry() {
        let mut session = new_session();
        let grace = Duration::from_secs(30);
        assert!(!session.is_expired(Utc::now(), grace));

        session.transition_to(CallState::Failed, None).unwrap();
        let ended_at = session.ended_at().unwrap();
        assert!(!session.is_expired(ended_at, grace));
        assert!(session.is_expired(ended_at + ChronoDuration::seconds(30), grace));
    }
}
