//! Audio Transport Bridge
//!
//! Runs the duplex media loop of every bridged call. Four loops share one
//! cancellation token, which the session cancels when it leaves `Bridged`:
//!
//! - reader: carrier events into the inbound buffer
//! - listener: inbound frames through utterance detection to transcription
//! - speaker: agent turns through synthesis into the outbound queue
//! - writer: outbound queue to the carrier, paced at one frame per 20 ms

use super::conversation::{UtteranceAssembler, UtteranceChunk};
use crate::domain::agent::{AgentDirectory, AgentProfile, ConversationAgent};
use crate::domain::call::{
    CallSessionRegistry, CallState, EndReason, SynthesisHandle, TranscriptSegment, TransportHandle,
};
use crate::domain::shared::{AgentId, CallError, CallId, Result};
use crate::infrastructure::media::vad::VadConfig;
use crate::infrastructure::media::{
    FrameChunker, InboundAudioBuffer, MediaSink, MediaSource, MediaTransport, OutboundAudioQueue,
    OutboundItem, StreamEvent, FRAME_BYTES, FRAME_DURATION,
};
use crate::infrastructure::media::protocol::OutboundMessage;
use crate::infrastructure::speech::{
    AudioChunk, SpeechSynthesisClient, TranscriptFragment, TranscriptionRelay,
};
use crate::infrastructure::telemetry;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub inbound_capacity: usize,
    pub outbound_depth: usize,
    /// Frames per non-final transcription chunk
    pub chunk_frames: usize,
    pub frame_duration: Duration,
    /// Total inbound frames a call may drop before it is failed
    pub max_dropped_frames: u64,
    pub vad: VadConfig,
    pub default_voice_id: String,
    /// Bound on transcribing the last utterance during teardown
    pub flush_timeout: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            inbound_capacity: 250,
            outbound_depth: 50,
            chunk_frames: 25,
            frame_duration: FRAME_DURATION,
            max_dropped_frames: 1500,
            vad: VadConfig::default(),
            default_voice_id: "EXAVITQu4vr4xnSDxMaL".to_string(),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-call state shared by the four loops
struct CallLink {
    call_id: CallId,
    stream_sid: String,
    profile: AgentProfile,
    cancel: CancellationToken,
    inbound: InboundAudioBuffer,
    outbound: OutboundAudioQueue,
    /// Marks sent to the carrier and not yet echoed back as played
    unplayed_marks: AtomicUsize,
    synthesis_requests: AtomicU64,
}

enum Control {
    /// Drop audio the carrier has buffered
    Clear,
}

pub struct AudioBridge {
    registry: Arc<CallSessionRegistry>,
    agents: Arc<dyn AgentDirectory>,
    conversation: Arc<dyn ConversationAgent>,
    synthesis: Arc<SpeechSynthesisClient>,
    transcription: Arc<TranscriptionRelay>,
    settings: BridgeSettings,
}

impl AudioBridge {
    pub fn new(
        registry: Arc<CallSessionRegistry>,
        agents: Arc<dyn AgentDirectory>,
        conversation: Arc<dyn ConversationAgent>,
        synthesis: Arc<SpeechSynthesisClient>,
        transcription: Arc<TranscriptionRelay>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            registry,
            agents,
            conversation,
            synthesis,
            transcription,
            settings,
        }
    }

    /// Bind a carrier media stream to its session and start the media loop
    ///
    /// Fails with `SessionNotFound` when no session is waiting for media
    /// under `call_id` (unknown, already bridged, or winding down). The
    /// returned handle completes once the call's media side is torn down.
    pub async fn attach(
        self: &Arc<Self>,
        call_id: &CallId,
        transport: MediaTransport,
    ) -> Result<JoinHandle<()>> {
        let snapshot = self
            .registry
            .get(call_id)
            .await
            .ok_or_else(|| CallError::SessionNotFound(call_id.to_string()))?;
        let profile = self.profile_for(&snapshot.agent_id).await;

        let MediaTransport {
            stream_sid,
            source,
            sink,
        } = transport;
        let cancel = CancellationToken::new();
        let handle = TransportHandle::new(stream_sid.clone(), cancel.clone());
        self.registry
            .update(call_id, |session| session.attach_transport(handle))
            .await
            .map_err(|e| match e {
                CallError::CallNotFound(id) => CallError::SessionNotFound(id),
                other => other,
            })?;

        telemetry::record_bridge_attached();
        info!(
            "Call {} bridged to media stream {} (agent {})",
            call_id, stream_sid, profile.id
        );

        let link = CallLink {
            call_id: call_id.clone(),
            stream_sid,
            profile,
            cancel,
            inbound: InboundAudioBuffer::new(self.settings.inbound_capacity),
            outbound: OutboundAudioQueue::new(self.settings.outbound_depth),
            unplayed_marks: AtomicUsize::new(0),
            synthesis_requests: AtomicU64::new(0),
        };

        let bridge = Arc::clone(self);
        Ok(tokio::spawn(async move {
            bridge.run(link, source, sink).await;
        }))
    }

    /// Release a call's media side
    ///
    /// Idempotent: a bridged call moves to `Ending`, which cancels its
    /// media loop; any other state, or an unknown call, is left as is.
    pub async fn detach(&self, call_id: &CallId) -> Result<()> {
        let result = self
            .registry
            .update(call_id, |session| {
                if session.state() != CallState::Bridged {
                    return Ok(false);
                }
                session.transition_to(CallState::Ending, Some(EndReason::TransportClosed))?;
                Ok(true)
            })
            .await;

        match result {
            Ok(true) => {
                info!("Call {} media stream closed", call_id);
                Ok(())
            }
            Ok(false) | Err(CallError::CallNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn profile_for(&self, agent_id: &AgentId) -> AgentProfile {
        match self.agents.resolve(agent_id).await {
            Some(profile) => profile,
            None => {
                warn!(
                    "Agent {} no longer configured, bridging with default voice",
                    agent_id
                );
                AgentProfile {
                    id: agent_id.clone(),
                    name: agent_id.to_string(),
                    voice_id: self.settings.default_voice_id.clone(),
                    greeting: None,
                    instructions: String::new(),
                }
            }
        }
    }

    async fn run(&self, link: CallLink, source: Box<dyn MediaSource>, sink: Box<dyn MediaSink>) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (turn_tx, turn_rx) = mpsc::channel(4);

        let ((), leftover, (), ()) = tokio::join!(
            self.read_loop(&link, source),
            self.listen_loop(&link, turn_tx, control_tx),
            self.speak_loop(&link, turn_rx),
            self.write_loop(&link, sink, control_rx),
        );

        self.teardown(&link, leftover).await;
    }

    async fn read_loop(&self, link: &CallLink, mut source: Box<dyn MediaSource>) {
        loop {
            let event = tokio::select! {
                _ = link.cancel.cancelled() => break,
                event = source.next_event() => event,
            };

            match event {
                Some(Ok(StreamEvent::Media(frame))) => {
                    if !link.inbound.push(frame).await {
                        continue;
                    }
                    telemetry::record_inbound_frames_dropped(1);
                    let dropped = link.inbound.frames_dropped();
                    if dropped > self.settings.max_dropped_frames {
                        let reason = CallError::BufferOverflow(format!(
                            "{} inbound frames dropped",
                            dropped
                        ));
                        error!("Call {} failed: {}", link.call_id, reason);
                        if let Err(e) = self
                            .registry
                            .transition(&link.call_id, CallState::Failed, Some(EndReason::BufferOverflow))
                            .await
                        {
                            debug!("Overflow on call {} after it ended: {}", link.call_id, e);
                        }
                        break;
                    }
                }
                Some(Ok(StreamEvent::Mark(name))) => {
                    let _ = link.unplayed_marks.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        n.checked_sub(1)
                    });
                    debug!("Call {} played mark {}", link.call_id, name);
                }
                Some(Ok(StreamEvent::Dtmf(digit))) => {
                    info!("Call {} DTMF {}", link.call_id, digit);
                }
                Some(Ok(StreamEvent::Stop)) | None => {
                    self.detach_quietly(&link.call_id).await;
                    break;
                }
                Some(Err(e)) => {
                    warn!("Call {} media stream error: {}", link.call_id, e);
                    self.detach_quietly(&link.call_id).await;
                    break;
                }
            }
        }
        link.inbound.close();
    }

    /// Returns the utterance left open when the call ended
    async fn listen_loop(
        &self,
        link: &CallLink,
        turns: mpsc::Sender<String>,
        control: mpsc::UnboundedSender<Control>,
    ) -> Option<UtteranceChunk> {
        let mut assembler = UtteranceAssembler::new(self.settings.vad.clone(), self.settings.chunk_frames);

        loop {
            let frame = tokio::select! {
                _ = link.cancel.cancelled() => break,
                frame = link.inbound.pop() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let Some(chunk) = assembler.push(&frame.payload) else {
                continue;
            };
            let end_of_utterance = chunk.end_of_utterance;
            let request = AudioChunk {
                call_id: link.call_id.clone(),
                audio: chunk.audio,
                end_of_utterance,
            };

            let transcription = self.transcription.transcribe(request);
            tokio::pin!(transcription);
            let outcome = tokio::select! {
                outcome = &mut transcription => outcome,
                _ = link.cancel.cancelled() => {
                    // The assembler has already given this audio away
                    if end_of_utterance {
                        self.record_late_utterance(link, transcription).await;
                    }
                    break;
                }
            };

            let utterance = match outcome {
                Ok(fragment) if fragment.is_final => fragment.text,
                Ok(_) => continue,
                Err(e) => {
                    telemetry::record_transcription_failure();
                    if !end_of_utterance {
                        continue;
                    }
                    warn!("Call {} utterance lost: {}", link.call_id, e);
                    String::new()
                }
            };

            if !self.record(link, TranscriptSegment::caller(utterance.as_str())).await {
                break;
            }
            self.barge_in(link, &control).await;
            if turns.send(utterance).await.is_err() {
                break;
            }
        }

        for frame in link.inbound.drain().await {
            assembler.absorb(&frame.payload);
        }
        assembler.flush()
    }

    /// Stop agent playback because the caller has the floor
    async fn barge_in(&self, link: &CallLink, control: &mpsc::UnboundedSender<Control>) {
        let synthesizing = self
            .registry
            .update(&link.call_id, |session| Ok(session.cancel_synthesis()))
            .await
            .unwrap_or(false);
        let discarded = link.outbound.clear().await;
        let unplayed = link.unplayed_marks.load(Ordering::Acquire);

        if synthesizing || discarded > 0 || unplayed > 0 {
            debug!(
                "Call {} barge-in: {} queued frames discarded",
                link.call_id, discarded
            );
            let _ = control.send(Control::Clear);
        }
    }

    async fn speak_loop(&self, link: &CallLink, mut turns: mpsc::Receiver<String>) {
        let mut sequence = link.outbound.next_sequence().await;

        if let Some(greeting) = link.profile.greeting.clone() {
            if self.record(link, TranscriptSegment::agent(greeting.as_str())).await {
                self.speak(link, &greeting, &mut sequence).await;
            }
        }

        loop {
            let utterance = tokio::select! {
                _ = link.cancel.cancelled() => break,
                utterance = turns.recv() => match utterance {
                    Some(utterance) => utterance,
                    None => break,
                },
            };

            let history = self
                .registry
                .get(&link.call_id)
                .await
                .map(|snapshot| snapshot.transcript)
                .unwrap_or_default();

            let reply = tokio::select! {
                _ = link.cancel.cancelled() => break,
                reply = self.conversation.respond(&link.profile, &history, &utterance) => reply,
            };
            let reply = match reply {
                Ok(Some(reply)) if !reply.trim().is_empty() => reply,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Call {} agent produced no reply: {}", link.call_id, e);
                    continue;
                }
            };

            if !self.record(link, TranscriptSegment::agent(reply.as_str())).await {
                break;
            }
            self.speak(link, &reply, &mut sequence).await;
        }
    }

    /// Append to the transcript; `false` once the session no longer accepts it
    async fn record(&self, link: &CallLink, segment: TranscriptSegment) -> bool {
        match self
            .registry
            .update(&link.call_id, |session| session.append_transcript(segment))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!("Call {} transcript closed: {}", link.call_id, e);
                false
            }
        }
    }

    /// Synthesize one agent line into the outbound queue
    ///
    /// Synthesis failures skip this line's audio and leave the call up.
    async fn speak(&self, link: &CallLink, text: &str, sequence: &mut u64) {
        let request_id = link.synthesis_requests.fetch_add(1, Ordering::Relaxed);
        let cancel = link.cancel.child_token();
        let handle = SynthesisHandle::new(request_id, cancel.clone());
        if self
            .registry
            .update(&link.call_id, |session| session.begin_synthesis(handle))
            .await
            .is_err()
        {
            return;
        }

        match self
            .synthesis
            .synthesize(text, &link.profile.voice_id, cancel.clone())
            .await
        {
            Ok(mut stream) => {
                let mut chunker = FrameChunker::new(FRAME_BYTES);
                let mut complete = true;

                while let Some(chunk) = stream.next_chunk().await {
                    match chunk {
                        Ok(bytes) => {
                            for frame in chunker.push(&bytes) {
                                if !self.enqueue(link, sequence, OutboundItem::Audio(frame), &cancel).await {
                                    complete = false;
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Call {} synthesis stream broke off: {}", link.call_id, e);
                            telemetry::record_synthesis_failure();
                            break;
                        }
                    }
                    if !complete {
                        break;
                    }
                }

                if complete && !cancel.is_cancelled() {
                    if let Some(tail) = chunker.flush() {
                        self.enqueue(link, sequence, OutboundItem::Audio(tail), &cancel).await;
                    }
                    let mark = format!("turn-{}", request_id);
                    self.enqueue(link, sequence, OutboundItem::Mark(mark), &cancel).await;
                }
            }
            Err(e) => {
                warn!(
                    "Call {} skipping agent audio this turn: {}",
                    link.call_id, e
                );
                telemetry::record_synthesis_failure();
            }
        }

        let _ = self
            .registry
            .update(&link.call_id, |session| {
                session.finish_synthesis(request_id);
                Ok(())
            })
            .await;
    }

    /// Returns `false` when the item was not queued
    async fn enqueue(
        &self,
        link: &CallLink,
        sequence: &mut u64,
        item: OutboundItem,
        cancel: &CancellationToken,
    ) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        match link.outbound.enqueue(*sequence, item, cancel).await {
            Ok(true) => {
                *sequence += 1;
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!("Call {} outbound queue refused audio: {}", link.call_id, e);
                false
            }
        }
    }

    async fn write_loop(
        &self,
        link: &CallLink,
        mut sink: Box<dyn MediaSink>,
        mut control: mpsc::UnboundedReceiver<Control>,
    ) {
        let mut pace = tokio::time::interval(self.settings.frame_duration);
        pace.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let message = tokio::select! {
                biased;
                _ = link.cancel.cancelled() => break,
                Some(Control::Clear) = control.recv() => OutboundMessage::clear(&link.stream_sid),
                item = link.outbound.next() => match item {
                    Some(queued) => match queued.item {
                        OutboundItem::Audio(frame) => {
                            pace.tick().await;
                            OutboundMessage::media(&link.stream_sid, &frame)
                        }
                        OutboundItem::Mark(name) => {
                            link.unplayed_marks.fetch_add(1, Ordering::AcqRel);
                            OutboundMessage::mark(&link.stream_sid, name)
                        }
                    },
                    None => break,
                },
            };

            if let Err(e) = sink.send(message).await {
                warn!("Call {} could not write to media stream: {}", link.call_id, e);
                self.detach_quietly(&link.call_id).await;
                break;
            }
        }

        sink.close().await;
    }

    async fn detach_quietly(&self, call_id: &CallId) {
        if let Err(e) = self.detach(call_id).await {
            debug!("Detach of call {} skipped: {}", call_id, e);
        }
    }

    /// Finish transcribing a final chunk after the call was cancelled
    ///
    /// Bounded by `flush_timeout`; the segment is recorded only if it has text.
    async fn record_late_utterance<F>(&self, link: &CallLink, transcription: F)
    where
        F: Future<Output = Result<TranscriptFragment>>,
    {
        match tokio::time::timeout(self.settings.flush_timeout, transcription).await {
            Ok(Ok(fragment)) if fragment.is_final && !fragment.text.trim().is_empty() => {
                self.record(link, TranscriptSegment::caller(fragment.text)).await;
            }
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => {
                telemetry::record_transcription_failure();
                debug!("Call {} final utterance not transcribed", link.call_id);
            }
        }
    }

    /// Flush the last utterance, release upstream state and finish the call
    async fn teardown(&self, link: &CallLink, leftover: Option<UtteranceChunk>) {
        link.outbound.close().await;

        if let Some(chunk) = leftover.filter(|chunk| !chunk.audio.is_empty()) {
            let request = AudioChunk {
                call_id: link.call_id.clone(),
                audio: chunk.audio,
                end_of_utterance: true,
            };
            self.record_late_utterance(link, self.transcription.transcribe(request))
                .await;
        }
        self.transcription.release(&link.call_id).await;

        let stats = link.inbound.stats().await;
        let finished = self
            .registry
            .update(&link.call_id, |session| {
                if session.state() == CallState::Bridged {
                    session.transition_to(CallState::Ending, Some(EndReason::TransportClosed))?;
                }
                if session.state() != CallState::Ending {
                    return Ok(session.state());
                }
                session.transition_to(CallState::Terminated, None)?;
                Ok(CallState::Terminated)
            })
            .await;

        match finished {
            Ok(state) => info!(
                "Call {} media torn down ({}; {} frames received, {} dropped)",
                link.call_id, state, stats.frames_received, stats.frames_dropped
            ),
            Err(e) => debug!("Call {} gone before teardown finished: {}", link.call_id, e),
        }
    }
}
