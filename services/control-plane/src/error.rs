//! Orchestrator errors and their HTTP rendering

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::clients::ClientError;
use crate::db::StoreError;
use crate::models::SessionStatus;

/// Errors surfaced by orchestrator operations.
///
/// Soft dependency failures never appear here; they are recorded in the
/// teardown report or reflected in the PnL source instead.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("owner not found: {0}")]
    OwnerNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("failed to open channel: {0}")]
    ChannelOpenFailed(#[source] ClientError),

    #[error("session {session_id} cannot move from {from} to {to}")]
    InvalidState {
        session_id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    HardDependencyFailure,
    InvalidState,
    InvalidInput,
    Internal,
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::OwnerNotFound(_)
            | OrchestratorError::AgentNotFound(_)
            | OrchestratorError::SessionNotFound(_) => ErrorKind::NotFound,
            OrchestratorError::ChannelOpenFailed(_) => ErrorKind::HardDependencyFailure,
            OrchestratorError::InvalidState { .. } => ErrorKind::InvalidState,
            OrchestratorError::InvalidInput(_) => ErrorKind::InvalidInput,
            OrchestratorError::Store(_) => ErrorKind::Internal,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            OrchestratorError::OwnerNotFound(_) => "owner_not_found",
            OrchestratorError::AgentNotFound(_) => "agent_not_found",
            OrchestratorError::SessionNotFound(_) => "session_not_found",
            OrchestratorError::ChannelOpenFailed(_) => "channel_open_failed",
            OrchestratorError::InvalidState { .. } => "invalid_state",
            OrchestratorError::InvalidInput(_) => "invalid_input",
            OrchestratorError::Store(_) => "internal_error",
        }
    }
}

/// JSON error returned by every handler
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal_error",
            message: message.into(),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let status = match err.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::HardDependencyFailure | ErrorKind::Internal => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        OrchestratorError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            OrchestratorError::AgentNotFound("ghost".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            OrchestratorError::ChannelOpenFailed(ClientError::Unavailable("down".into())).kind(),
            ErrorKind::HardDependencyFailure
        );
        assert_eq!(
            OrchestratorError::InvalidState {
                session_id: "s".into(),
                from: SessionStatus::Error,
                to: SessionStatus::Closing,
            }
            .kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn test_http_status_mapping() {
        let not_found: ApiError = OrchestratorError::SessionNotFound("sess_x".into()).into();
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);
        assert_eq!(not_found.code, "session_not_found");

        let bad: ApiError = OrchestratorError::InvalidInput("duration".into()).into();
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let conflict: ApiError = OrchestratorError::InvalidState {
            session_id: "s".into(),
            from: SessionStatus::Error,
            to: SessionStatus::Closing,
        }
        .into();
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let hard: ApiError =
            OrchestratorError::ChannelOpenFailed(ClientError::Rejected("no".into())).into();
        assert_eq!(hard.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(hard.code, "channel_open_failed");
    }
}
