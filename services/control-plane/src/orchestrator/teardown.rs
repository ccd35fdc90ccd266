//! Outcome report for the best-effort stop sequence

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use tracing::warn;

use crate::clients::{ChannelClose, ClientError, SettlementReceipt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    NotifyStop,
    FetchFinalPnl,
    CloseChannel,
    RecordSettlement,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::NotifyStop => "notify_stop",
            StepName::FetchFinalPnl => "fetch_final_pnl",
            StepName::CloseChannel => "close_channel",
            StepName::RecordSettlement => "record_settlement",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeardownStep {
    pub step: StepName,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Where a reported PnL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PnlSource {
    /// Fresh value from the execution service
    Live,
    /// Last value persisted on the session
    Persisted,
}

/// What happened during a stop. Attached to the result, never blocks the
/// terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
    #[serde(with = "rust_decimal::serde::float")]
    pub final_pnl_usd: Decimal,
    pub pnl_source: PnlSource,
    pub channel_close: Option<ChannelClose>,
    pub receipt: Option<SettlementReceipt>,
}

impl TeardownReport {
    pub(crate) fn new(persisted_pnl: Decimal) -> Self {
        Self {
            steps: Vec::with_capacity(4),
            final_pnl_usd: persisted_pnl,
            pnl_source: PnlSource::Persisted,
            channel_close: None,
            receipt: None,
        }
    }

    /// Record a step result; failures are logged and swallowed
    pub(crate) fn record<T>(
        &mut self,
        session_id: &str,
        step: StepName,
        result: Result<T, ClientError>,
    ) -> Option<T> {
        match result {
            Ok(value) => {
                self.steps.push(TeardownStep {
                    step,
                    outcome: StepOutcome::Completed,
                });
                Some(value)
            }
            Err(e) => {
                warn!(session_id = %session_id, step = %step, error = %e, "teardown step failed");
                self.steps.push(TeardownStep {
                    step,
                    outcome: StepOutcome::Failed {
                        error: e.to_string(),
                    },
                });
                None
            }
        }
    }

    pub(crate) fn skip(&mut self, step: StepName, reason: impl Into<String>) {
        self.steps.push(TeardownStep {
            step,
            outcome: StepOutcome::Skipped {
                reason: reason.into(),
            },
        });
    }

    pub fn outcome(&self, step: StepName) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| &s.outcome)
    }

    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_steps() == 0
    }
}
