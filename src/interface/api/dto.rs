//! API DTOs (Data Transfer Objects)

use crate::domain::call::CallSnapshot;
use crate::domain::shared::{CallError, ErrorClass};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Generic API response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_class: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            error_class: None,
        }
    }
}

/// A [`CallError`] rendered as an error envelope with a matching status
#[derive(Debug)]
pub struct ApiError(pub CallError);

impl From<CallError> for ApiError {
    fn from(e: CallError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match (&self.0, self.0.class()) {
            (CallError::CallNotFound(_) | CallError::SessionNotFound(_), _) => StatusCode::NOT_FOUND,
            (_, ErrorClass::Validation) => StatusCode::BAD_REQUEST,
            (_, ErrorClass::StateConflict) => StatusCode::CONFLICT,
            (_, ErrorClass::UpstreamUnavailable) => StatusCode::BAD_GATEWAY,
            (_, ErrorClass::ResourceExhaustion) => StatusCode::SERVICE_UNAVAILABLE,
            (_, ErrorClass::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.0.to_string()),
            error_class: Some(self.0.class()),
        };
        (status, Json(body)).into_response()
    }
}

/// Place call request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallRequest {
    pub agent_id: String,
    pub phone_number: String,
    pub caller_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallResponse {
    pub call_id: String,
}

/// One row of the active calls list
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCallInfo {
    pub call_id: String,
    pub agent_id: String,
    pub phone_number: String,
    pub status: String,
    /// Seconds since the call was placed
    pub duration: i64,
}

impl From<&CallSnapshot> for ActiveCallInfo {
    fn from(snapshot: &CallSnapshot) -> Self {
        Self {
            call_id: snapshot.call_id.to_string(),
            agent_id: snapshot.agent_id.to_string(),
            phone_number: snapshot.callee.to_string(),
            status: snapshot.state.as_str().to_string(),
            duration: snapshot.duration_secs(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallActionResponse {
    pub call_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_calls: usize,
}
