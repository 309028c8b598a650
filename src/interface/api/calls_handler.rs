//! Call Management API handlers

use super::dto::{
    ActiveCallInfo, ApiError, ApiResponse, CallActionResponse, HealthResponse, InitiateCallRequest,
    InitiateCallResponse,
};
use super::state::AppState;
use crate::domain::call::CallSnapshot;
use crate::domain::shared::{AgentId, CallError, CallId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, warn};

/// Place an outbound call
pub async fn initiate_call(
    State(state): State<AppState>,
    Json(request): Json<InitiateCallRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InitiateCallResponse>>), ApiError> {
    info!(
        "API: Placing call for agent {} to {}",
        request.agent_id, request.phone_number
    );

    let call_id = state
        .controller
        .initiate_call(
            &AgentId::new(request.agent_id),
            &request.phone_number,
            request.caller_number.as_deref(),
        )
        .await
        .inspect_err(|e| warn!("API: Call placement rejected: {}", e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(InitiateCallResponse {
            call_id: call_id.to_string(),
        })),
    ))
}

/// List calls that have not ended yet
pub async fn list_calls(State(state): State<AppState>) -> Json<ApiResponse<Vec<ActiveCallInfo>>> {
    let calls = state
        .registry
        .list_active()
        .await
        .iter()
        .map(ActiveCallInfo::from)
        .collect();
    Json(ApiResponse::success(calls))
}

/// Full snapshot of one call, including its transcript
pub async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<ApiResponse<CallSnapshot>>, ApiError> {
    let snapshot = state
        .registry
        .get(&CallId::new(call_id.as_str()))
        .await
        .ok_or(CallError::CallNotFound(call_id))?;
    Ok(Json(ApiResponse::success(snapshot)))
}

/// Hang up a call
pub async fn end_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<ApiResponse<CallActionResponse>>, ApiError> {
    info!("API: Ending call {}", call_id);
    let call_id = CallId::new(call_id);
    state.controller.end_call(&call_id).await?;
    Ok(Json(ApiResponse::success(action_response(&state, call_id).await)))
}

/// Administrative termination
pub async fn force_terminate_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<ApiResponse<CallActionResponse>>, ApiError> {
    warn!("API: Force-terminating call {}", call_id);
    let call_id = CallId::new(call_id);
    state.controller.force_terminate(&call_id).await?;
    Ok(Json(ApiResponse::success(action_response(&state, call_id).await)))
}

async fn action_response(state: &AppState, call_id: CallId) -> CallActionResponse {
    let status = state
        .registry
        .get(&call_id)
        .await
        .map_or("Unknown", |snapshot| snapshot.state.as_str());
    CallActionResponse {
        call_id: call_id.to_string(),
        status: status.to_string(),
    }
}

/// Health check
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        active_calls: state.registry.active_count().await,
    }))
}
