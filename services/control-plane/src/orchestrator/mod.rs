//! Session orchestration
//!
//! Drives the session lifecycle by sequencing calls to the channel service,
//! the execution service and the settlement recorder:
//!
//! - start: channel open is a hard dependency; delegation failure leaves an
//!   `error` session behind instead of raising.
//! - status: live PnL is reconciled into the store when available, stale
//!   values are served otherwise.
//! - stop: every teardown step is best-effort and the session always ends
//!   `closed`, including sessions whose delegation failed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clients::{
    bounded, ChannelService, ClientError, ExecutionService, ExecutionStart, SettlementRecord,
    SettlementRecorder, TradeReport,
};
use crate::db::{SessionPatch, SessionStore, StoreError};
use crate::error::OrchestratorError;
use crate::observability::{metrics, Logger, MetricsCollector};
use crate::registry::AgentCatalog;
use crate::retry::{with_retry, RetryConfig};
use crate::models::{Session, SessionStatus, StopReason, Trade, TradeFill, TradeSide};

mod lifecycle;
pub mod locks;
pub mod reputation;
pub mod teardown;

pub use locks::SessionLocks;
pub use reputation::{recent_closed, reputation, trade_win_rate, Reputation};
pub use teardown::{PnlSource, StepName, StepOutcome, TeardownReport, TeardownStep};

use lifecycle::check_transition;

pub const MAX_SESSION_SECONDS: u64 = 86_400;

/// Independent time budget for each kind of remote call
#[derive(Debug, Clone, PartialEq)]
pub struct CallTimeouts {
    pub channel_open: Duration,
    pub channel_close: Duration,
    pub execution: Duration,
    pub settlement: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            channel_open: Duration::from_secs(10),
            channel_close: Duration::from_secs(10),
            execution: Duration::from_secs(5),
            settlement: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartSessionParams {
    pub owner_wallet: String,
    pub agent_id: String,
    pub safe_address: String,
    pub base_collateral_usd: Decimal,
    pub max_duration_seconds: u64,
    pub market: Option<String>,
}

impl StartSessionParams {
    fn validate(&self) -> Result<(), OrchestratorError> {
        if self.safe_address.trim().is_empty() {
            return Err(OrchestratorError::InvalidInput(
                "safeAddress is required".to_string(),
            ));
        }
        if self.base_collateral_usd <= Decimal::ZERO {
            return Err(OrchestratorError::InvalidInput(
                "baseCollateralUsd must be positive".to_string(),
            ));
        }
        if !(1..=MAX_SESSION_SECONDS).contains(&self.max_duration_seconds) {
            return Err(OrchestratorError::InvalidInput(format!(
                "maxDurationSeconds must be between 1 and {}",
                MAX_SESSION_SECONDS
            )));
        }
        Ok(())
    }
}

/// Channel settlement as derived from the session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Settled,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub channel_id: Option<String>,
    pub settlement_status: ChannelStatus,
}

impl ChannelInfo {
    fn for_session(session: &Session) -> Self {
        Self {
            channel_id: session.channel_id.clone(),
            settlement_status: if session.status == SessionStatus::Closed {
                ChannelStatus::Settled
            } else {
                ChannelStatus::InProgress
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatusView {
    pub session: Session,
    pub trades: Vec<Trade>,
    pub channel: ChannelInfo,
    pub pnl_source: PnlSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopOutcome {
    pub session: Session,
    /// `None` when the session was already closed and nothing ran
    pub report: Option<TeardownReport>,
}

pub struct SessionOrchestrator {
    store: Arc<dyn SessionStore>,
    agents: Arc<AgentCatalog>,
    channels: Arc<dyn ChannelService>,
    execution: Arc<dyn ExecutionService>,
    settlement: Arc<dyn SettlementRecorder>,
    timeouts: CallTimeouts,
    retry: RetryConfig,
    locks: SessionLocks,
    metrics: MetricsCollector,
}

impl SessionOrchestrator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        agents: Arc<AgentCatalog>,
        channels: Arc<dyn ChannelService>,
        execution: Arc<dyn ExecutionService>,
        settlement: Arc<dyn SettlementRecorder>,
    ) -> Self {
        Self {
            store,
            agents,
            channels,
            execution,
            settlement,
            timeouts: CallTimeouts::default(),
            retry: RetryConfig::default(),
            locks: SessionLocks::new(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: CallTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    async fn load(&self, session_id: &str) -> Result<Session, OrchestratorError> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))
    }

    /// Open a channel, persist a `pending` session and delegate it to the
    /// execution service.
    ///
    /// The returned session always carries a channel id. Its status is
    /// `running` when delegation succeeded and `error` when it did not.
    pub async fn start_session(
        &self,
        params: StartSessionParams,
    ) -> Result<Session, OrchestratorError> {
        params.validate()?;

        let owner = self
            .store
            .find_user_by_wallet(&params.owner_wallet)
            .await?
            .ok_or_else(|| OrchestratorError::OwnerNotFound(params.owner_wallet.clone()))?;
        let agent = self
            .agents
            .get(&params.agent_id)
            .ok_or_else(|| OrchestratorError::AgentNotFound(params.agent_id.clone()))?;

        let market = match params.market.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => agent.markets.first().cloned().ok_or_else(|| {
                OrchestratorError::InvalidInput(format!("agent {} has no markets", agent.id))
            })?,
        };

        // 1. Channel (hard dependency)
        let handle = with_retry(
            || {
                bounded(
                    "channel_open",
                    self.timeouts.channel_open,
                    self.channels.open(&params.safe_address, &agent.payout_address),
                )
            },
            &self.retry,
        )
        .await;
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.metrics.increment(metrics::CHANNEL_OPEN_FAILED, 1).await;
                warn!(agent_id = %agent.id, error = %e, "channel open failed");
                return Err(OrchestratorError::ChannelOpenFailed(e));
            }
        };

        // 2. Record
        let session = Session::pending(
            &owner.id,
            &agent.id,
            params.safe_address.trim(),
            handle.channel_id.clone(),
        );
        if let Err(e) = self.store.put_session(&session).await {
            self.compensate_channel(&handle.channel_id).await;
            return Err(e.into());
        }
        Logger::session_event(&session.id, "created", &handle.channel_id);

        // 3. Delegation (failure leaves an error session)
        let request = ExecutionStart {
            session_id: session.id.clone(),
            agent_id: agent.id.clone(),
            owner_address: owner.wallet_address.clone(),
            safe_address: session.safe_address.clone(),
            market,
            base_collateral_usd: params.base_collateral_usd,
            max_duration_seconds: params.max_duration_seconds,
        };
        let delegated = bounded(
            "execution_start",
            self.timeouts.execution,
            self.execution.start(&request),
        )
        .await;

        let next = match delegated {
            Ok(()) => SessionStatus::Running,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "execution service did not start session");
                self.metrics.increment(metrics::START_DELEGATION_FAILED, 1).await;
                SessionStatus::Error
            }
        };

        let session = match self.transition(&session.id, next, SessionPatch::default()).await {
            Ok(updated) => updated,
            // A concurrent stop got there first; report what is stored
            Err(OrchestratorError::InvalidState { .. }) => self.load(&session.id).await?,
            Err(e) => return Err(e),
        };

        self.metrics.increment(metrics::SESSION_STARTED, 1).await;
        Logger::session_event(&session.id, "started", session.status.as_str());
        Ok(session)
    }

    /// Close a channel whose session could not be recorded
    async fn compensate_channel(&self, channel_id: &str) {
        let closed = bounded(
            "channel_close",
            self.timeouts.channel_close,
            self.channels.close(channel_id),
        )
        .await;
        if let Err(e) = closed {
            warn!(channel_id = %channel_id, error = %e, "orphaned channel could not be closed");
        }
    }

    /// Session, its trades and channel info, with live PnL reconciled into
    /// the store when the execution service answers.
    pub async fn session_status(
        &self,
        session_id: &str,
    ) -> Result<SessionStatusView, OrchestratorError> {
        let mut session = self.load(session_id).await?;
        let mut pnl_source = PnlSource::Persisted;

        // Terminal sessions carry their final PnL
        if !session.status.is_terminal() {
            let live = bounded(
                "execution_status",
                self.timeouts.execution,
                self.execution.status(session_id),
            )
            .await;

            match live {
                Ok(live) => {
                    self.reconcile_trades(session_id, &live.trades).await;
                    if let Some(pnl) = live.pnl_usd {
                        let (current, applied) = self.write_live_pnl(session_id, pnl).await?;
                        session = current;
                        if applied {
                            pnl_source = PnlSource::Live;
                        }
                    }
                }
                Err(e) => {
                    debug!(session_id = %session_id, error = %e, "live status unavailable, serving persisted PnL");
                    self.metrics.increment(metrics::RECONCILE_FAILED, 1).await;
                }
            }
        }

        let trades = self.store.trades_for_session(session_id).await?;
        let channel = ChannelInfo::for_session(&session);

        Ok(SessionStatusView {
            session,
            trades,
            channel,
            pnl_source,
        })
    }

    /// Persist a live PnL unless the session went terminal meanwhile.
    /// Returns the stored record and whether the live value now stands.
    async fn write_live_pnl(
        &self,
        session_id: &str,
        pnl: Decimal,
    ) -> Result<(Session, bool), OrchestratorError> {
        let _guard = self.locks.acquire(session_id).await;
        let current = self.load(session_id).await?;

        if current.status.is_terminal() {
            return Ok((current, false));
        }
        if current.pnl_usd == pnl {
            return Ok((current, true));
        }

        let updated = self
            .store
            .update_session(session_id, SessionPatch::default().pnl_usd(pnl))
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;
        self.metrics.increment(metrics::PNL_RECONCILED, 1).await;
        debug!(session_id = %session_id, pnl_usd = %pnl, "reconciled live PnL");
        Ok((updated, true))
    }

    /// Insert unseen trades and close open ones the execution service reports
    /// as closed. Failures are logged and skipped.
    async fn reconcile_trades(&self, session_id: &str, reports: &[TradeReport]) {
        for report in reports {
            if let Err(e) = self.reconcile_trade(session_id, report).await {
                warn!(session_id = %session_id, trade_id = %report.id, error = %e, "trade reconciliation failed");
                self.metrics.increment(metrics::RECONCILE_FAILED, 1).await;
            }
        }
    }

    async fn reconcile_trade(&self, session_id: &str, report: &TradeReport) -> Result<(), StoreError> {
        if report.size_usd <= Decimal::ZERO {
            debug!(trade_id = %report.id, "skipping trade report with non-positive size");
            return Ok(());
        }

        match self.store.get_trade(&report.id).await? {
            None => {
                let mut trade = Trade {
                    id: report.id.clone(),
                    session_id: session_id.to_string(),
                    symbol: report.symbol.clone(),
                    side: report.side,
                    size_usd: report.size_usd,
                    entry_price: report.entry_price,
                    exit_price: None,
                    opened_at: report.opened_at,
                    closed_at: None,
                    pnl_usd: None,
                };
                if let Some(fill) = fill_from_report(report) {
                    trade.close(&fill);
                }
                match self.store.put_trade(&trade).await {
                    // Raced with another reconciliation
                    Ok(()) | Err(StoreError::Duplicate(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            Some(existing) if existing.session_id != session_id => {
                warn!(trade_id = %report.id, owner = %existing.session_id, "trade reported for a different session");
                Ok(())
            }
            Some(existing) if existing.is_closed() => Ok(()),
            Some(_) => {
                if let Some(fill) = fill_from_report(report) {
                    self.store.close_trade(&report.id, fill).await?;
                }
                Ok(())
            }
        }
    }

    /// Stop a session. Teardown steps are best-effort; the session always
    /// ends `closed`.
    ///
    /// Stopping a `closed` session returns it unchanged without side effects.
    /// A `closing` session (interrupted earlier stop) re-runs teardown. An
    /// `error` session keeps its status while teardown releases its channel,
    /// then moves to `closed` with its original `ended_at`.
    pub async fn stop_session(
        &self,
        session_id: &str,
        reason: StopReason,
    ) -> Result<StopOutcome, OrchestratorError> {
        let started = Instant::now();

        // 1. Enter closing
        let session = {
            let _guard = self.locks.acquire(session_id).await;
            let current = self.load(session_id).await?;
            match current.status {
                SessionStatus::Closed => {
                    debug!(session_id = %session_id, "stop on closed session is a no-op");
                    return Ok(StopOutcome {
                        session: current,
                        report: None,
                    });
                }
                SessionStatus::Closing | SessionStatus::Error => current,
                _ => {
                    check_transition(&current, SessionStatus::Closing)?;
                    self.store
                        .update_session(
                            session_id,
                            SessionPatch::default().status(SessionStatus::Closing),
                        )
                        .await?
                        .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?
                }
            }
        };
        info!(session_id = %session_id, reason = reason.as_str(), "stopping session");

        let mut report = TeardownReport::new(session.pnl_usd);

        // 2. Tell the execution service to stop
        report.record(
            session_id,
            StepName::NotifyStop,
            bounded(
                "execution_stop",
                self.timeouts.execution,
                self.execution.stop(session_id, reason),
            )
            .await,
        );

        // 3. Final PnL
        let final_status = bounded(
            "execution_status",
            self.timeouts.execution,
            self.execution.status(session_id),
        )
        .await;
        if let Some(status) = report.record(session_id, StepName::FetchFinalPnl, final_status) {
            self.reconcile_trades(session_id, &status.trades).await;
            if let Some(pnl) = status.pnl_usd {
                report.final_pnl_usd = pnl;
                report.pnl_source = PnlSource::Live;
            }
        }

        // 4. Channel
        match &session.channel_id {
            Some(channel_id) => {
                let closed = bounded(
                    "channel_close",
                    self.timeouts.channel_close,
                    self.channels.close(channel_id),
                )
                .await;
                report.channel_close = report.record(session_id, StepName::CloseChannel, closed);
            }
            None => report.skip(StepName::CloseChannel, "session has no channel"),
        }

        // 5. Settlement, against the session's owner
        match self.store.get_user(&session.user_id).await {
            Ok(Some(owner)) => {
                let record = SettlementRecord {
                    session_id: session_id.to_string(),
                    owner_address: owner.wallet_address,
                    agent_id: session.agent_id.clone(),
                    pnl_usd: report.final_pnl_usd,
                    channel_id: session.channel_id.clone(),
                };
                let recorded = bounded(
                    "settlement_record",
                    self.timeouts.settlement,
                    self.settlement.record(&record),
                )
                .await;
                report.receipt = report.record(session_id, StepName::RecordSettlement, recorded);
            }
            Ok(None) => report.skip(StepName::RecordSettlement, "owner not found"),
            Err(e) => {
                report.record::<()>(
                    session_id,
                    StepName::RecordSettlement,
                    Err(ClientError::Unavailable(format!("owner lookup failed: {}", e))),
                );
            }
        }

        // 6. Terminal transition, regardless of the above
        let patch = SessionPatch::default().pnl_usd(report.final_pnl_usd);
        let session = match self.transition(session_id, SessionStatus::Closed, patch).await {
            Ok(closed) => closed,
            // A concurrent stop already closed it
            Err(OrchestratorError::InvalidState {
                from: SessionStatus::Closed,
                ..
            }) => self.load(session_id).await?,
            Err(e) => return Err(e),
        };

        let failed = report.failed_steps() as u64;
        self.metrics.increment(metrics::SESSION_STOPPED, 1).await;
        if failed > 0 {
            self.metrics.increment(metrics::TEARDOWN_STEP_FAILED, failed).await;
        }
        self.metrics
            .histogram(
                metrics::TEARDOWN_DURATION_MS,
                started.elapsed().as_millis() as f64,
            )
            .await;
        Logger::session_event(
            session_id,
            "closed",
            &format!("reason={} failed_steps={}", reason.as_str(), failed),
        );

        Ok(StopOutcome {
            session,
            report: Some(report),
        })
    }
}

/// Terminal fill of a reported trade, if the report says it closed
fn fill_from_report(report: &TradeReport) -> Option<TradeFill> {
    let exit_price = report.exit_price?;
    let closed_at: DateTime<Utc> = report.closed_at?;
    let pnl_usd = report
        .pnl_usd
        .unwrap_or_else(|| realized_pnl(report.side, report.size_usd, report.entry_price, exit_price));

    Some(TradeFill {
        exit_price,
        closed_at,
        pnl_usd,
    })
}

/// PnL of a USD-notional position between two prices
fn realized_pnl(side: TradeSide, size_usd: Decimal, entry: Decimal, exit: Decimal) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    let change = (exit - entry) / entry;
    match side {
        TradeSide::Long => size_usd * change,
        TradeSide::Short => -size_usd * change,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> StartSessionParams {
        StartSessionParams {
            owner_wallet: "0xowner".into(),
            agent_id: "trend-bandit-v1".into(),
            safe_address: "0xsafe".into(),
            base_collateral_usd: dec!(50),
            max_duration_seconds: 600,
            market: None,
        }
    }

    #[test]
    fn test_params_validation() {
        assert!(params().validate().is_ok());

        let mut p = params();
        p.base_collateral_usd = dec!(0);
        assert!(matches!(p.validate(), Err(OrchestratorError::InvalidInput(_))));

        let mut p = params();
        p.max_duration_seconds = 0;
        assert!(p.validate().is_err());
        p.max_duration_seconds = MAX_SESSION_SECONDS + 1;
        assert!(p.validate().is_err());
        p.max_duration_seconds = MAX_SESSION_SECONDS;
        assert!(p.validate().is_ok());

        let mut p = params();
        p.safe_address = "  ".into();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_realized_pnl_by_side() {
        assert_eq!(realized_pnl(TradeSide::Long, dec!(100), dec!(50), dec!(55)), dec!(10));
        assert_eq!(realized_pnl(TradeSide::Short, dec!(100), dec!(50), dec!(55)), dec!(-10));
        assert_eq!(realized_pnl(TradeSide::Long, dec!(100), dec!(0), dec!(55)), dec!(0));
    }

    #[test]
    fn test_fill_requires_exit_and_close_time() {
        let mut report = TradeReport {
            id: "t".into(),
            symbol: "BTCUSDT_PERP".into(),
            side: TradeSide::Short,
            size_usd: dec!(20),
            entry_price: dec!(100),
            opened_at: Utc::now(),
            exit_price: Some(dec!(90)),
            closed_at: None,
            pnl_usd: None,
        };
        assert!(fill_from_report(&report).is_none());

        report.closed_at = Some(Utc::now());
        let fill = fill_from_report(&report).unwrap();
        assert_eq!(fill.pnl_usd, dec!(2));

        report.pnl_usd = Some(dec!(1.5));
        assert_eq!(fill_from_report(&report).unwrap().pnl_usd, dec!(1.5));
    }

    #[test]
    fn test_channel_info_is_derived() {
        let mut session = Session::pending("u", "a", "0xsafe", "nl_1".into());
        assert_eq!(
            ChannelInfo::for_session(&session).settlement_status,
            ChannelStatus::InProgress
        );
        session.status = SessionStatus::Closed;
        assert_eq!(
            ChannelInfo::for_session(&session).settlement_status,
            ChannelStatus::Settled
        );
    }
}
