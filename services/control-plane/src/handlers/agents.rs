use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::db::SessionFilter;
use crate::error::ApiError;
use crate::models::api::{AgentDetailResponse, AgentWithReputation, ListAgentsResponse};
use crate::orchestrator::reputation;
use crate::AppState;

/// GET /agents
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListAgentsResponse>, ApiError> {
    let mut agents = Vec::with_capacity(state.agents.len());
    for agent in state.agents.all() {
        let sessions = state
            .store
            .scan_sessions(SessionFilter::Agent(agent.id.clone()))
            .await?;
        agents.push(AgentWithReputation {
            agent: agent.clone(),
            reputation: reputation(&sessions),
        });
    }

    Ok(Json(ListAgentsResponse { agents }))
}

/// GET /agents/{id}
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentDetailResponse>, ApiError> {
    let agent = state.agents.get(&agent_id).cloned().ok_or_else(|| {
        ApiError::not_found(
            "agent_not_found",
            format!("Agent with id {} not found", agent_id),
        )
    })?;

    let sessions = state
        .store
        .scan_sessions(SessionFilter::Agent(agent_id))
        .await?;

    Ok(Json(AgentDetailResponse::new(agent, &sessions)))
}
