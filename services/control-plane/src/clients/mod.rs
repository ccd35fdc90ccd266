//! Collaborators outside this process: settlement channels, the execution
//! service and the settlement recorder.

use std::time::Duration;

pub mod channel;
pub mod execution;
pub mod settlement;

pub use channel::{ChannelClose, ChannelHandle, ChannelService, ChannelSettlement, LocalChannelService};
pub use execution::{ExecutionService, ExecutionStart, ExecutionStatus, HttpExecutionClient, TradeReport};
pub use settlement::{LedgerSettlementRecorder, SettlementReceipt, SettlementRecord, SettlementRecorder};

/// Failure of a remote call
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{call} timed out after {after:?}")]
    Timeout { call: &'static str, after: Duration },

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Bound a remote call by its own timeout; expiry counts as that call's failure
pub async fn bounded<T, F>(call: &'static str, after: Duration, fut: F) -> Result<T, ClientError>
where
    F: std::future::Future<Output = Result<T, ClientError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout { call, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ClientError>(1)
        };
        let result = bounded("slow_call", Duration::from_millis(10), slow).await;
        assert!(matches!(result, Err(ClientError::Timeout { call: "slow_call", .. })));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let fast = async { Ok::<_, ClientError>(7) };
        let result = bounded("fast_call", Duration::from_secs(1), fast).await;
        assert_eq!(result.unwrap(), 7);
    }
}
