//! Speech Synthesis Client
//!
//! Streams synthesized agent speech in carrier format (8 kHz μ-law). Each
//! request is bounded by a timeout to first byte and retried once; a
//! request can be cancelled at any point and stops yielding audio.

use crate::domain::shared::{CallError, Result};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Raw audio chunks as produced by a synthesizer
pub type AudioByteStream = BoxStream<'static, Result<Bytes>>;

#[async_trait::async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Start synthesizing `text`; resolves once the first audio is ready
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioByteStream>;
}

/// A cancellable stream of synthesized audio
pub struct SynthesisStream {
    inner: AudioByteStream,
    cancel: CancellationToken,
}

impl SynthesisStream {
    pub fn new(inner: AudioByteStream, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    /// Next chunk; `None` when finished or cancelled
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            chunk = self.inner.next() => chunk,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_retries: 1,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Timeout, retry and cancellation around a [`SpeechSynthesizer`]
pub struct SpeechSynthesisClient {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    settings: SynthesisSettings,
}

impl SpeechSynthesisClient {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, settings: SynthesisSettings) -> Self {
        Self {
            synthesizer,
            settings,
        }
    }

    /// Open a synthesis stream
    ///
    /// Fails with `SynthesisUnavailable` once every attempt has failed or
    /// timed out. Returns a stream that yields nothing if `cancel` fires
    /// while the request is still being set up.
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        cancel: CancellationToken,
    ) -> Result<SynthesisStream> {
        let attempts = self.settings.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let request = tokio::time::timeout(
                self.settings.request_timeout,
                self.synthesizer.synthesize(text, voice_id),
            );

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Synthesis cancelled before audio arrived");
                    return Ok(SynthesisStream::new(futures::stream::empty::<Result<Bytes>>().boxed(), cancel));
                }
                outcome = request => outcome,
            };

            match outcome {
                Ok(Ok(stream)) => return Ok(SynthesisStream::new(stream, cancel)),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "no audio within {}ms",
                        self.settings.request_timeout.as_millis()
                    )
                }
            }

            warn!(
                "Speech synthesis attempt {}/{} failed: {}",
                attempt, attempts, last_error
            );
            if attempt < attempts {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Synthesis cancelled during retry backoff");
                        return Ok(SynthesisStream::new(futures::stream::empty::<Result<Bytes>>().boxed(), cancel));
                    }
                    _ = tokio::time::sleep(self.settings.retry_backoff) => {}
                }
            }
        }

        Err(CallError::SynthesisUnavailable(last_error))
    }
}

#[derive(Debug, Clone, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Debug, Clone, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Deserialize)]
struct UpstreamError {
    detail: Option<serde_json::Value>,
}

/// ElevenLabs streaming text-to-speech
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model_id: String,
    output_format: String,
    stability: f32,
    similarity_boost: f32,
}

impl ElevenLabsSynthesizer {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model_id: impl Into<String>,
        output_format: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_id: model_id.into(),
            output_format: output_format.into(),
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }

    pub fn with_voice_settings(mut self, stability: f32, similarity_boost: f32) -> Self {
        self.stability = stability;
        self.similarity_boost = similarity_boost;
        self
    }

    fn stream_url(&self, voice_id: &str) -> String {
        format!("{}/v1/text-to-speech/{}/stream", self.base_url, voice_id)
    }
}

#[async_trait::async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioByteStream> {
        if self.api_key.is_empty() {
            return Err(CallError::SynthesisUnavailable(
                "synthesis API key not configured".to_string(),
            ));
        }

        info!(
            "Synthesizing {} characters with voice {}",
            text.chars().count(),
            voice_id
        );

        let body = SynthesisRequest {
            text,
            model_id: &self.model_id,
            voice_settings: VoiceSettings {
                stability: self.stability,
                similarity_boost: self.similarity_boost,
            },
        };

        let response = self
            .client
            .post(self.stream_url(voice_id))
            .query(&[("output_format", self.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/basic")
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::SynthesisUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<UpstreamError>()
                .await
                .ok()
                .and_then(|e| e.detail)
                .map(|d| d.to_string())
                .unwrap_or_default();
            return Err(CallError::SynthesisUnavailable(format!(
                "synthesis upstream returned {}: {}",
                status, detail
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| CallError::SynthesisUnavailable(e.to_string())))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails a fixed number of times, then streams the given chunks
    struct FlakySynthesizer {
        failures: u32,
        calls: AtomicU32,
        chunks: Vec<Bytes>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl SpeechSynthesizer for FlakySynthesizer {
        async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<AudioByteStream> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if call < self.failures {
                return Err(CallError::SynthesisUnavailable("upstream 503".into()));
            }
            let chunks: Vec<Result<Bytes>> = self.chunks.iter().cloned().map(Ok).collect();
            Ok(futures::stream::iter(chunks).boxed())
        }
    }

    fn settings() -> SynthesisSettings {
        SynthesisSettings {
            request_timeout: Duration::from_millis(100),
            max_retries: 1,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn flaky(failures: u32, delay: Duration) -> Arc<FlakySynthesizer> {
        Arc::new(FlakySynthesizer {
            failures,
            calls: AtomicU32::new(0),
            chunks: vec![Bytes::from_static(&[1, 2]), Bytes::from_static(&[3])],
            delay,
        })
    }

    #[tokio::test]
    async fn test_streams_chunks() {
        let client = SpeechSynthesisClient::new(flaky(0, Duration::ZERO), settings());
        let mut stream = client
            .synthesize("hello", "voice", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stream.next_chunk().await.unwrap().unwrap(), Bytes::from_static(&[1, 2]));
        assert_eq!(stream.next_chunk().await.unwrap().unwrap(), Bytes::from_static(&[3]));
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_single_retry_recovers() {
        let synthesizer = flaky(1, Duration::ZERO);
        let client = SpeechSynthesisClient::new(synthesizer.clone(), settings());

        let result = client.synthesize("hello", "voice", CancellationToken::new()).await;
        assert!(result.is_ok());
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry() {
        let synthesizer = flaky(5, Duration::ZERO);
        let client = SpeechSynthesisClient::new(synthesizer.clone(), settings());

        let result = client.synthesize("hello", "voice", CancellationToken::new()).await;
        assert!(matches!(result, Err(CallError::SynthesisUnavailable(_))));
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let client = SpeechSynthesisClient::new(flaky(0, Duration::from_secs(5)), settings());

        let result = client.synthesize("hello", "voice", CancellationToken::new()).await;
        assert!(matches!(result, Err(CallError::SynthesisUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_retry_backoff() {
        let synthesizer = flaky(5, Duration::ZERO);
        let client = Arc::new(SpeechSynthesisClient::new(
            synthesizer.clone(),
            SynthesisSettings {
                retry_backoff: Duration::from_secs(10),
                ..settings()
            },
        ));
        let cancel = CancellationToken::new();

        let request = {
            let client = client.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { client.synthesize("hello", "voice", cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let mut stream = tokio::time::timeout(Duration::from_millis(100), request)
            .await
            .expect("backoff ignored cancellation")
            .unwrap()
            .unwrap();
        assert!(stream.next_chunk().await.is_none());
        assert_eq!(synthesizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_stream_yields_nothing() {
        let client = SpeechSynthesisClient::new(flaky(0, Duration::ZERO), settings());
        let cancel = CancellationToken::new();
        let mut stream = client.synthesize("hello", "voice", cancel.clone()).await.unwrap();

        cancel.cancel();
        assert!(stream.is_cancelled());
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let synthesizer = ElevenLabsSynthesizer::new(
            reqwest::Client::new(),
            "",
            "http://127.0.0.1:9",
            "eleven_monolingual_v1",
            "ulaw_8000",
        );
        let result = synthesizer.synthesize("hello", "voice").await;
        assert!(matches!(result, Err(CallError::SynthesisUnavailable(_))));
    }
}
