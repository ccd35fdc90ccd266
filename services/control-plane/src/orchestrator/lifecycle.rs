//! Session state machine
//!
//! ```text
//! pending -> running -> closing -> closed
//!    |          |                     ^
//!    +----------+-----> error --------+
//! ```
//!
//! `pending -> closing` is also allowed so a session whose delegation never
//! completed can still be stopped. Once a stop has moved a session to
//! `closing`, only `closed` follows. `error -> closed` is taken by an
//! explicit stop alone, after teardown. `closed` is absorbing.

use chrono::Utc;

use super::SessionOrchestrator;
use crate::db::SessionPatch;
use crate::error::OrchestratorError;
use crate::models::{Session, SessionStatus};

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Error)
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (*self, next),
            (Pending, Running)
                | (Pending, Closing)
                | (Pending, Error)
                | (Running, Closing)
                | (Running, Error)
                | (Closing, Closed)
                | (Error, Closed)
        )
    }
}

/// Reject a transition the state machine does not allow
pub(crate) fn check_transition(session: &Session, to: SessionStatus) -> Result<(), OrchestratorError> {
    if session.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(OrchestratorError::InvalidState {
            session_id: session.id.clone(),
            from: session.status,
            to,
        })
    }
}

impl SessionOrchestrator {
    /// Move a session to `to`, writing `patch` alongside the status.
    ///
    /// Read, check and write happen under the session's lock. Terminal
    /// transitions stamp `ended_at` unless it is already set.
    pub(crate) async fn transition(
        &self,
        session_id: &str,
        to: SessionStatus,
        patch: SessionPatch,
    ) -> Result<Session, OrchestratorError> {
        let _guard = self.locks.acquire(session_id).await;

        let current = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;
        check_transition(&current, to)?;

        let mut patch = patch.status(to);
        if to.is_terminal() && current.ended_at.is_none() {
            patch = patch.ended_at(Utc::now());
        }

        let updated = self
            .store
            .update_session(session_id, patch)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        tracing::debug!(
            session_id = %session_id,
            from = %current.status,
            to = %updated.status,
            "session transition"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    const ALL: [SessionStatus; 5] = [Pending, Running, Closing, Closed, Error];

    #[test]
    fn test_closed_is_absorbing() {
        for to in ALL {
            assert!(!Closed.can_transition_to(to), "closed -> {} allowed", to);
        }
    }

    #[test]
    fn test_error_only_leaves_for_closed() {
        assert!(Error.is_terminal());
        for to in ALL {
            assert_eq!(Error.can_transition_to(to), to == Closed, "error -> {}", to);
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));
    }

    #[test]
    fn test_setup_states_can_fail() {
        for from in [Pending, Running] {
            assert!(!from.is_terminal());
            assert!(from.can_transition_to(Error));
        }
    }

    #[test]
    fn test_closing_only_ends_closed() {
        assert!(!Closing.is_terminal());
        for to in ALL {
            assert_eq!(Closing.can_transition_to(to), to == Closed, "closing -> {}", to);
        }
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!Pending.can_transition_to(Closed));
        assert!(!Running.can_transition_to(Closed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Closing.can_transition_to(Running));
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn test_check_transition_reports_states() {
        let mut session = Session::pending("u", "a", "0xsafe", "nl_1".to_string());
        session.status = Closed;
        match check_transition(&session, Closing) {
            Err(OrchestratorError::InvalidState { from, to, .. }) => {
                assert_eq!(from, Closed);
                assert_eq!(to, Closing);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
