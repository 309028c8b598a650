//! Configuration management
//!
//! Loaded from an optional file, then overridden by `CALLWIRE__*`
//! environment variables (`CALLWIRE__TELEPHONY__AUTH_TOKEN`, ...).

use crate::infrastructure::media::vad::VadConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_PREFIX: &str = "CALLWIRE";
pub const DEFAULT_CONFIG_PATH: &str = "config/callwire";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub telephony: TelephonyConfig,
    pub synthesis: SynthesisConfig,
    pub transcription: TranscriptionConfig,
    pub llm: LlmConfig,
    pub calls: CallsConfig,
    pub agents: Vec<AgentConfig>,
}

impl Config {
    /// Load from `path` (any format the `config` crate knows, extension
    /// optional) layered under environment variables
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub api_base_url: String,
    /// Public HTTPS base URL the carrier uses for webhooks and media
    pub public_base_url: String,
    /// Caller ID used when a request does not name one
    pub default_caller_number: Option<String>,
    pub ring_timeout_secs: u32,
    pub record_calls: bool,
    pub validate_signatures: bool,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            api_base_url: "https://api.twilio.com".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            default_caller_number: None,
            ring_timeout_secs: 60,
            record_calls: false,
            validate_signatures: false,
        }
    }
}

impl TelephonyConfig {
    /// WebSocket URL the carrier should stream media to
    pub fn media_stream_url(&self) -> String {
        let base = self.public_base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("wss://{}", base)
        };
        format!("{}/media-stream", ws_base)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_id: String,
    pub output_format: String,
    pub default_voice_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.elevenlabs.io".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            output_format: "ulaw_8000".to_string(),
            default_voice_id: "EXAVITQu4vr4xnSDxMaL".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            request_timeout_ms: 10_000,
            max_retries: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: Option<String>,
    pub request_timeout_ms: u64,
    /// Frames forwarded per chunk while an utterance is open
    pub chunk_frames: usize,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com".to_string(),
            model: "whisper-1".to_string(),
            language: Some("en".to_string()),
            request_timeout_ms: 15_000,
            chunk_frames: 25,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout_ms: u64,
    /// Transcript segments sent along with each turn
    pub max_history: usize,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            request_timeout_ms: 20_000,
            max_history: 20,
            max_tokens: 150,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallsConfig {
    pub attach_timeout_secs: u64,
    pub ending_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub sweep_grace_secs: u64,
    pub pending_callback_ttl_secs: u64,
    pub pending_callbacks_per_call: usize,
    /// Distinct unknown call ids parked at once
    pub pending_callback_calls: usize,
    pub inbound_buffer_frames: usize,
    pub outbound_queue_frames: usize,
    pub max_dropped_frames: u64,
    pub start_timeout_secs: u64,
    pub vad: VadConfig,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            attach_timeout_secs: 90,
            ending_timeout_secs: 20,
            sweep_interval_secs: 5,
            sweep_grace_secs: 30,
            pending_callback_ttl_secs: 30,
            pending_callbacks_per_call: 16,
            pending_callback_calls: 1024,
            inbound_buffer_frames: 250,
            outbound_queue_frames: 50,
            max_dropped_frames: 1500,
            start_timeout_secs: 10,
            vad: VadConfig::default(),
        }
    }
}

impl CallsConfig {
    pub fn attach_timeout(&self) -> Duration {
        Duration::from_secs(self.attach_timeout_secs)
    }

    pub fn ending_timeout(&self) -> Duration {
        Duration::from_secs(self.ending_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn sweep_grace(&self) -> Duration {
        Duration::from_secs(self.sweep_grace_secs)
    }

    pub fn pending_callback_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_callback_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub instructions: String,
}
