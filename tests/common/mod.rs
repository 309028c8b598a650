//! Shared fakes and wiring for integration tests

#![allow(dead_code)]

use bytes::Bytes;
use callwire::application::{
    AudioBridge, BridgeSettings, CallController, ControllerSettings, InstrumentedSink,
    PendingCallbacks,
};
use callwire::domain::agent::{AgentProfile, ConversationAgent};
use callwire::domain::call::{CallSessionRegistry, CallState, TranscriptSegment};
use callwire::domain::shared::{AgentId, CallError, CallId, Result};
use callwire::infrastructure::agent::StaticAgentDirectory;
use callwire::infrastructure::media::vad::VadConfig;
use callwire::infrastructure::media::codec::g711::encode_sample;
use callwire::infrastructure::media::FRAME_BYTES;
use callwire::infrastructure::speech::{
    AudioByteStream, AudioChunk, SpeechSynthesisClient, SpeechSynthesizer, SynthesisSettings,
    TranscriptFragment, TranscriptionEngine, TranscriptionRelay,
};
use callwire::infrastructure::telephony::{PlaceCallRequest, TelephonyGateway};
use callwire::interface::api::{AppState, EventBroadcaster, WebhookSettings};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const AGENT: &str = "agent-1";
pub const CALLEE: &str = "+14155550123";
pub const CALLER: &str = "+15302886523";

/// Carrier double: hands out sequential call sids and records hang-ups
#[derive(Default)]
pub struct FakeGateway {
    next_sid: AtomicUsize,
    pub reject_with: Mutex<Option<String>>,
    pub placed: Mutex<Vec<PlaceCallRequest>>,
    pub hung_up: Mutex<Vec<CallId>>,
}

#[async_trait::async_trait]
impl TelephonyGateway for FakeGateway {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<CallId> {
        let rejection = self.reject_with.lock().unwrap().clone();
        if let Some(reason) = rejection {
            return Err(CallError::CallPlacementFailed(reason));
        }
        self.placed.lock().unwrap().push(request.clone());
        let n = self.next_sid.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CallId::new(format!("CA{:032}", n)))
    }

    async fn end_call(&self, call_id: &CallId) -> Result<()> {
        self.hung_up.lock().unwrap().push(call_id.clone());
        Ok(())
    }
}

/// Replies by echoing the caller; silent on empty input
pub struct EchoAgent;

#[async_trait::async_trait]
impl ConversationAgent for EchoAgent {
    async fn respond(
        &self,
        _agent: &AgentProfile,
        _history: &[TranscriptSegment],
        input: &str,
    ) -> Result<Option<String>> {
        Ok((!input.is_empty()).then(|| format!("You said: {}", input)))
    }
}

/// Produces a fixed amount of μ-law audio per request
pub struct ToneSynthesizer {
    pub bytes: usize,
    pub down: AtomicBool,
}

#[async_trait::async_trait]
impl SpeechSynthesizer for ToneSynthesizer {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<AudioByteStream> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CallError::SynthesisUnavailable("503 from upstream".into()));
        }
        let audio = Bytes::from(vec![0x7F; self.bytes]);
        Ok(futures::stream::iter(vec![Ok(audio)]).boxed())
    }
}

/// Returns scripted final transcripts, one per utterance
#[derive(Default)]
pub struct ScriptedTranscriber {
    pub lines: Mutex<VecDeque<String>>,
    pub down: AtomicBool,
    pub released: Mutex<Vec<CallId>>,
}

#[async_trait::async_trait]
impl TranscriptionEngine for ScriptedTranscriber {
    async fn transcribe(&self, chunk: AudioChunk) -> Result<TranscriptFragment> {
        if self.down.load(Ordering::SeqCst) {
            return Err(CallError::TranscriptionUnavailable("connection refused".into()));
        }
        if !chunk.end_of_utterance {
            return Ok(TranscriptFragment::partial());
        }
        let line = self.lines.lock().unwrap().pop_front().unwrap_or_default();
        Ok(TranscriptFragment::final_text(line))
    }

    async fn release(&self, call_id: &CallId) {
        self.released.lock().unwrap().push(call_id.clone());
    }
}

pub struct Harness {
    pub registry: Arc<CallSessionRegistry>,
    pub controller: Arc<CallController>,
    pub bridge: Arc<AudioBridge>,
    pub gateway: Arc<FakeGateway>,
    pub synthesizer: Arc<ToneSynthesizer>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub events: Arc<EventBroadcaster>,
}

pub struct HarnessOptions {
    pub greeting: Option<&'static str>,
    pub grace: Duration,
    pub attach_timeout: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            greeting: None,
            grace: Duration::from_secs(30),
            attach_timeout: Duration::from_secs(90),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let events = Arc::new(EventBroadcaster::new());
        let registry = Arc::new(CallSessionRegistry::new(
            Arc::new(InstrumentedSink::new(events.clone())),
            options.grace,
        ));
        let agents = Arc::new(StaticAgentDirectory::new(vec![AgentProfile {
            id: AgentId::new(AGENT),
            name: "Ava".to_string(),
            voice_id: "voice-1".to_string(),
            greeting: options.greeting.map(str::to_string),
            instructions: "Be brief.".to_string(),
        }]));
        let gateway = Arc::new(FakeGateway::default());

        let controller = Arc::new(CallController::new(
            registry.clone(),
            gateway.clone(),
            agents.clone(),
            Arc::new(PendingCallbacks::new(Duration::from_secs(30), 16)),
            ControllerSettings {
                default_caller: None,
                attach_timeout: options.attach_timeout,
                ending_timeout: Duration::from_secs(20),
            },
        ));

        let synthesizer = Arc::new(ToneSynthesizer {
            bytes: 480,
            down: AtomicBool::new(false),
        });
        let transcriber = Arc::new(ScriptedTranscriber::default());
        let bridge = Arc::new(AudioBridge::new(
            registry.clone(),
            agents,
            Arc::new(EchoAgent),
            Arc::new(SpeechSynthesisClient::new(
                synthesizer.clone(),
                SynthesisSettings {
                    request_timeout: Duration::from_millis(500),
                    max_retries: 1,
                    retry_backoff: Duration::from_millis(1),
                },
            )),
            Arc::new(TranscriptionRelay::new(
                transcriber.clone(),
                Duration::from_millis(500),
            )),
            BridgeSettings {
                chunk_frames: 5,
                frame_duration: Duration::from_millis(1),
                vad: VadConfig {
                    open_voiced_frames: 2,
                    close_silence_ms: 100,
                    max_utterance_ms: 10_000,
                    energy_threshold: 400.0,
                },
                flush_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        ));

        Self {
            registry,
            controller,
            bridge,
            gateway,
            synthesizer,
            transcriber,
            events,
        }
    }

    pub fn script(&self, lines: &[&str]) {
        self.transcriber
            .lines
            .lock()
            .unwrap()
            .extend(lines.iter().map(|l| l.to_string()));
    }

    pub fn app_state(&self, webhooks: WebhookSettings) -> AppState {
        AppState {
            controller: self.controller.clone(),
            registry: self.registry.clone(),
            bridge: self.bridge.clone(),
            webhooks: Arc::new(webhooks),
        }
    }

    pub async fn place_call(&self) -> CallId {
        self.controller
            .initiate_call(&AgentId::new(AGENT), CALLEE, Some(CALLER))
            .await
            .unwrap()
    }

    pub async fn state(&self, call_id: &CallId) -> CallState {
        self.registry.get(call_id).await.unwrap().state
    }

    /// Poll until the call reaches `state`
    pub async fn wait_for_state(&self, call_id: &CallId, state: CallState) {
        for _ in 0..300 {
            if self.registry.get(call_id).await.map(|s| s.state) == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("call {} never reached {}", call_id, state);
    }

    pub async fn wait_for_transcript(&self, call_id: &CallId, len: usize) -> Vec<TranscriptSegment> {
        for _ in 0..300 {
            let transcript = self.registry.get(call_id).await.unwrap().transcript;
            if transcript.len() >= len {
                return transcript;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("call {} transcript never reached {} segments", call_id, len);
    }
}

pub fn webhooks_without_signatures() -> WebhookSettings {
    WebhookSettings {
        public_base_url: "https://calls.example.com".to_string(),
        media_stream_url: "wss://calls.example.com/media-stream".to_string(),
        validator: None,
        start_timeout: Duration::from_secs(2),
    }
}

/// One 20 ms frame of loud tone
pub fn voiced_frame() -> Bytes {
    (0..FRAME_BYTES)
        .map(|i| encode_sample(if i % 2 == 0 { 8000 } else { -8000 }))
        .collect::<Vec<u8>>()
        .into()
}

pub fn silent_frame() -> Bytes {
    Bytes::from(vec![0xFF; FRAME_BYTES])
}

/// Frames of one spoken utterance followed by enough silence to close it
pub fn utterance_frames() -> Vec<Bytes> {
    let mut frames = vec![voiced_frame(); 10];
    frames.extend(std::iter::repeat(silent_frame()).take(10));
    frames
}
