//! Carrier webhooks: call status callbacks and the call-control document

use super::state::AppState;
use crate::application::CallbackOutcome;
use crate::domain::shared::{AgentId, CallError, CallId};
use crate::infrastructure::telephony::signature::SIGNATURE_HEADER;
use crate::infrastructure::telephony::twiml;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

pub const STATUS_CALLBACK_PATH: &str = "/callbacks/status";

/// Carrier status callback
///
/// Answers 204 for anything well formed, including duplicates and
/// callbacks for unknown calls, so the carrier does not retry.
pub async fn status_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    if let Some(validator) = &state.webhooks.validator {
        let url = format!("{}{}", state.webhooks.public_base_url, STATUS_CALLBACK_PATH);
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !validator.verify(&url, &params, signature) {
            warn!("Rejected status callback with invalid signature");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let field = |name: &str| {
        params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    };
    let (Some(call_sid), Some(call_status)) = (field("CallSid"), field("CallStatus")) else {
        warn!("Status callback without CallSid/CallStatus");
        return StatusCode::BAD_REQUEST.into_response();
    };

    let call_id = CallId::new(call_sid);
    match state
        .controller
        .handle_status_callback(&call_id, call_status)
        .await
    {
        Ok(CallbackOutcome::Applied { from, to }) => {
            debug!("Status callback {} moved call {} {} -> {}", call_status, call_id, from, to);
        }
        Ok(outcome) => debug!("Status callback {} for call {}: {:?}", call_status, call_id, outcome),
        Err(CallError::AlreadyTerminal(_)) => {
            debug!("Status callback {} for finished call {}", call_status, call_id);
        }
        Err(e) => warn!("Status callback {} for call {} not applied: {}", call_status, call_id, e),
    }

    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwimlQuery {
    pub agent_id: Option<String>,
}

/// Call-control document fetched by the carrier once the callee answers
pub async fn twiml(State(state): State<AppState>, Query(query): Query<TwimlQuery>) -> Response {
    let agent_id = query.agent_id.map(AgentId::new);
    info!(
        "Serving media stream instructions (agent: {})",
        agent_id.as_ref().map_or("-", |id| id.as_str())
    );
    let body = twiml::connect_stream(&state.webhooks.media_stream_url, agent_id.as_ref());
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}
