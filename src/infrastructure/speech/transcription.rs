//! Transcription Relay
//!
//! Forwards caller audio chunks to a transcription engine and hands back
//! transcript fragments. Every request is bounded by a timeout; a failed or
//! slow request surfaces as `TranscriptionUnavailable` so the conversation
//! can carry on without that utterance.

use crate::domain::shared::{CallError, CallId, Result};
use crate::infrastructure::media::codec::MulawCodec;
use crate::infrastructure::media::wav::{self, WavFormat};
use bytes::{Bytes, BytesMut};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A slice of caller audio (8 kHz μ-law)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub call_id: CallId,
    pub audio: Bytes,
    /// Last chunk of the current utterance
    pub end_of_utterance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranscriptFragment {
    pub text: String,
    pub is_final: bool,
}

impl TranscriptFragment {
    pub fn partial() -> Self {
        Self::default()
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(&self, chunk: AudioChunk) -> Result<TranscriptFragment>;

    /// Drop any state kept for a call
    async fn release(&self, call_id: &CallId);
}

pub struct TranscriptionRelay {
    engine: Arc<dyn TranscriptionEngine>,
    request_timeout: Duration,
}

impl TranscriptionRelay {
    pub fn new(engine: Arc<dyn TranscriptionEngine>, request_timeout: Duration) -> Self {
        Self {
            engine,
            request_timeout,
        }
    }

    pub async fn transcribe(&self, chunk: AudioChunk) -> Result<TranscriptFragment> {
        let call_id = chunk.call_id.clone();
        match tokio::time::timeout(self.request_timeout, self.engine.transcribe(chunk)).await {
            Ok(Ok(fragment)) => Ok(fragment),
            Ok(Err(e)) => {
                warn!("Transcription failed for call {}: {}", call_id, e);
                Err(match e {
                    CallError::TranscriptionUnavailable(_) => e,
                    other => CallError::TranscriptionUnavailable(other.to_string()),
                })
            }
            Err(_) => {
                warn!(
                    "Transcription timed out for call {} after {}ms",
                    call_id,
                    self.request_timeout.as_millis()
                );
                Err(CallError::TranscriptionUnavailable(format!(
                    "no result within {}ms",
                    self.request_timeout.as_millis()
                )))
            }
        }
    }

    pub async fn release(&self, call_id: &CallId) {
        self.engine.release(call_id).await;
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

/// OpenAI Whisper transcription
///
/// Whisper is not incremental: chunks are accumulated per call and the
/// whole utterance is uploaded when its final chunk arrives.
pub struct WhisperEngine {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    language: Option<String>,
    max_utterance_bytes: usize,
    utterances: Mutex<HashMap<CallId, BytesMut>>,
}

impl WhisperEngine {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            language: None,
            // 30 s of 8 kHz μ-law
            max_utterance_bytes: 30 * 8000,
            utterances: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language.filter(|l| !l.is_empty());
        self
    }

    async fn upload(&self, audio: Bytes) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(CallError::TranscriptionUnavailable(
                "transcription API key not configured".to_string(),
            ));
        }

        let pcm = MulawCodec::new().decode(&audio);
        let wav = wav::encode_pcm16(WavFormat::telephony_pcm16(), &pcm);

        let file = reqwest::multipart::Part::bytes(wav.to_vec())
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| CallError::Internal(e.to_string()))?;
        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "json");
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CallError::TranscriptionUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::TranscriptionUnavailable(format!(
                "transcription upstream returned {}: {}",
                status, body
            )));
        }

        let parsed: WhisperResponse = response
            .json()
            .await
            .map_err(|e| CallError::TranscriptionUnavailable(e.to_string()))?;
        Ok(parsed.text.trim().to_string())
    }
}

#[async_trait::async_trait]
impl TranscriptionEngine for WhisperEngine {
    async fn transcribe(&self, chunk: AudioChunk) -> Result<TranscriptFragment> {
        let utterance = {
            let mut utterances = self.utterances.lock().await;
            let buffer = utterances.entry(chunk.call_id.clone()).or_default();
            let room = self.max_utterance_bytes.saturating_sub(buffer.len());
            if chunk.audio.len() > room {
                debug!(
                    "Utterance for call {} exceeds {} bytes, truncating",
                    chunk.call_id, self.max_utterance_bytes
                );
            }
            buffer.extend_from_slice(&chunk.audio[..chunk.audio.len().min(room)]);

            if !chunk.end_of_utterance {
                return Ok(TranscriptFragment::partial());
            }
            utterances
                .remove(&chunk.call_id)
                .map(BytesMut::freeze)
                .unwrap_or_default()
        };

        if utterance.is_empty() {
            return Ok(TranscriptFragment::final_text(""));
        }

        let text = self.upload(utterance).await?;
        debug!("Transcribed utterance for call {}: {:?}", chunk.call_id, text);
        Ok(TranscriptFragment::final_text(text))
    }

    async fn release(&self, call_id: &CallId) {
        self.utterances.lock().await.remove(call_id);
    }
}
