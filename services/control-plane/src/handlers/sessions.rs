use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::db::SessionFilter;
use crate::error::ApiError;
use crate::middleware::WalletContext;
use crate::models::api::{
    ListSessionsResponse, SessionStatusResponse, StartSessionRequest, StartSessionResponse,
    StopSessionRequest, StopSessionResponse,
};
use crate::models::StopReason;
use crate::orchestrator::StartSessionParams;
use crate::AppState;

/// POST /sessions/start
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Extension(wallet): Extension<WalletContext>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let agent_id = non_blank(req.agent_id.as_deref())
        .ok_or_else(|| ApiError::bad_request("missing_agent_id", "agentId is required"))?
        .to_string();
    start(&state, wallet, agent_id, req).await
}

/// POST /agents/{id}/session/start
pub async fn start_agent_session(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Extension(wallet): Extension<WalletContext>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    start(&state, wallet, agent_id, req).await
}

async fn start(
    state: &AppState,
    wallet: WalletContext,
    agent_id: String,
    req: StartSessionRequest,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let safe_address = non_blank(req.safe_address.as_deref())
        .ok_or_else(|| {
            ApiError::bad_request("missing_safe_address", "safeAddress is required in request body")
        })?
        .to_string();
    if let Err(errors) = req.validate() {
        return Err(ApiError::bad_request("invalid_request", errors.to_string()));
    }

    let defaults = &state.session_defaults;
    let params = StartSessionParams {
        owner_wallet: wallet.wallet_address,
        agent_id,
        safe_address,
        base_collateral_usd: req.base_collateral_usd.unwrap_or(defaults.base_collateral_usd),
        max_duration_seconds: req
            .max_duration_seconds
            .unwrap_or(defaults.max_duration_seconds),
        market: req.market,
    };

    let session = state.orchestrator.start_session(params).await?;
    Ok(Json(session.into()))
}

/// GET /sessions/{id}/status
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    let view = state.orchestrator.session_status(&session_id).await?;
    Ok(Json(view.into()))
}

/// GET /agents/{id}/session/{session_id}/status
pub async fn agent_session_status(
    State(state): State<Arc<AppState>>,
    Path((agent_id, session_id)): Path<(String, String)>,
) -> Result<Json<SessionStatusResponse>, ApiError> {
    ensure_agent_session(&state, &agent_id, &session_id).await?;
    session_status(State(state), Path(session_id)).await
}

/// POST /sessions/{id}/stop
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<StopSessionResponse>, ApiError> {
    let reason = parse_stop_reason(&body)?;
    let outcome = state.orchestrator.stop_session(&session_id, reason).await?;
    let trades = state.store.trades_for_session(&session_id).await?;
    Ok(Json(StopSessionResponse::new(outcome, &trades)))
}

/// POST /agents/{id}/session/{session_id}/stop
pub async fn stop_agent_session(
    State(state): State<Arc<AppState>>,
    Path((agent_id, session_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<StopSessionResponse>, ApiError> {
    ensure_agent_session(&state, &agent_id, &session_id).await?;
    stop_session(State(state), Path(session_id), body).await
}

/// GET /sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(wallet): Extension<WalletContext>,
) -> Result<Json<ListSessionsResponse>, ApiError> {
    let Some(user) = state.store.find_user_by_wallet(&wallet.wallet_address).await? else {
        return Ok(Json(ListSessionsResponse { sessions: vec![] }));
    };

    let sessions = state.store.scan_sessions(SessionFilter::User(user.id)).await?;
    Ok(Json(ListSessionsResponse {
        sessions: sessions.into_iter().map(Into::into).collect(),
    }))
}

/// An empty body means the default reason
fn parse_stop_reason(body: &[u8]) -> Result<StopReason, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(StopReason::default());
    }

    let req: StopSessionRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request("invalid_request", e.to_string()))?;
    match non_blank(req.reason.as_deref()) {
        Some(reason) => reason
            .parse()
            .map_err(|e: String| ApiError::bad_request("invalid_reason", e)),
        None => Ok(StopReason::default()),
    }
}

async fn ensure_agent_session(
    state: &AppState,
    agent_id: &str,
    session_id: &str,
) -> Result<(), ApiError> {
    match state.store.get_session(session_id).await? {
        Some(session) if session.agent_id == agent_id => Ok(()),
        _ => Err(ApiError::not_found(
            "session_not_found",
            format!("session not found: {}", session_id),
        )),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
