//! Shared handler state

use crate::application::{AudioBridge, CallController};
use crate::config::TelephonyConfig;
use crate::domain::call::CallSessionRegistry;
use crate::infrastructure::telephony::SignatureValidator;
use std::sync::Arc;
use std::time::Duration;

/// Carrier-facing webhook settings
pub struct WebhookSettings {
    /// Externally visible base URL, as signed by the carrier
    pub public_base_url: String,
    pub media_stream_url: String,
    /// `None` disables signature checks (local development)
    pub validator: Option<SignatureValidator>,
    /// How long a new media stream may take to send its `start` message
    pub start_timeout: Duration,
}

impl WebhookSettings {
    pub fn from_config(config: &TelephonyConfig, start_timeout: Duration) -> Self {
        Self {
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            media_stream_url: config.media_stream_url(),
            validator: config
                .validate_signatures
                .then(|| SignatureValidator::new(config.auth_token.clone())),
            start_timeout,
        }
    }
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<CallController>,
    pub registry: Arc<CallSessionRegistry>,
    pub bridge: Arc<AudioBridge>,
    pub webhooks: Arc<WebhookSettings>,
}
