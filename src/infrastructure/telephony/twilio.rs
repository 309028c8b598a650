//! Twilio REST implementation of the telephony gateway

use super::gateway::{PlaceCallRequest, TelephonyGateway};
use crate::config::TelephonyConfig;
use crate::domain::shared::{CallError, CallId, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const API_VERSION: &str = "2010-04-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

pub struct TwilioGateway {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    api_base_url: String,
    public_base_url: String,
    ring_timeout_secs: u32,
    record_calls: bool,
}

impl TwilioGateway {
    pub fn new(client: reqwest::Client, config: &TelephonyConfig) -> Self {
        if config.account_sid.is_empty() || config.auth_token.is_empty() {
            warn!("Twilio credentials not configured; call placement will fail");
        }
        Self {
            client,
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            ring_timeout_secs: config.ring_timeout_secs,
            record_calls: config.record_calls,
        }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/{}/Accounts/{}/Calls.json",
            self.api_base_url, API_VERSION, self.account_sid
        )
    }

    fn call_url(&self, call_id: &CallId) -> String {
        format!(
            "{}/{}/Accounts/{}/Calls/{}.json",
            self.api_base_url, API_VERSION, self.account_sid, call_id
        )
    }

    /// Form body for the create-call request
    fn placement_form(&self, request: &PlaceCallRequest) -> Vec<(&'static str, String)> {
        let twiml_base = format!("{}/twiml", self.public_base_url);
        let twiml_url = reqwest::Url::parse_with_params(
            &twiml_base,
            &[("agentId", request.agent_id.as_str())],
        )
        .map(|url| url.to_string())
        .unwrap_or(twiml_base);

        let mut form = vec![
            ("To", request.to.to_string()),
            ("From", request.from.to_string()),
            ("Url", twiml_url),
            ("Method", "POST".to_string()),
            (
                "StatusCallback",
                format!("{}/callbacks/status", self.public_base_url),
            ),
            ("StatusCallbackMethod", "POST".to_string()),
            ("Timeout", self.ring_timeout_secs.to_string()),
        ];
        for event in ["initiated", "ringing", "answered", "completed"] {
            form.push(("StatusCallbackEvent", event.to_string()));
        }
        if self.record_calls {
            form.push(("Record", "true".to_string()));
        }
        form
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<TwilioErrorBody>().await {
            Ok(TwilioErrorBody {
                code: Some(code),
                message: Some(message),
            }) => format!("{} (code {})", message, code),
            Ok(TwilioErrorBody {
                message: Some(message),
                ..
            }) => message,
            _ => format!("carrier returned {}", status),
        }
    }
}

#[async_trait::async_trait]
impl TelephonyGateway for TwilioGateway {
    async fn place_call(&self, request: &PlaceCallRequest) -> Result<CallId> {
        let response = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .timeout(REQUEST_TIMEOUT)
            .form(&self.placement_form(request))
            .send()
            .await
            .map_err(|e| CallError::CallPlacementFailed(e.to_string()))?;

        if !response.status().is_success() {
            let reason = Self::error_message(response).await;
            warn!("Carrier rejected call to {}: {}", request.to, reason);
            return Err(CallError::CallPlacementFailed(reason));
        }

        let call: CallResource = response
            .json()
            .await
            .map_err(|e| CallError::CallPlacementFailed(format!("invalid carrier reply: {}", e)))?;

        info!(
            "Carrier accepted call {} to {} (status {})",
            call.sid,
            request.to,
            call.status.as_deref().unwrap_or("unknown")
        );
        Ok(CallId::new(call.sid))
    }

    async fn end_call(&self, call_id: &CallId) -> Result<()> {
        let response = self
            .client
            .post(self.call_url(call_id))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .timeout(REQUEST_TIMEOUT)
            .form(&[("Status", "completed")])
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let reason = Self::error_message(response).await;
            return Err(CallError::Transport(format!(
                "carrier refused to end call {}: {}",
                call_id, reason
            )));
        }

        info!("Requested carrier hang-up for call {}", call_id);
        Ok(())
    }
}
