//! Request and response bodies of the HTTP API

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Agent, Session, SessionStatus, Trade, TradeSide, User};
use crate::clients::{ChannelSettlement, SettlementReceipt};
use crate::orchestrator::{
    recent_closed, trade_win_rate, ChannelStatus, PnlSource, Reputation, SessionStatusView,
    StopOutcome, TeardownStep,
};

// Request types for API

#[derive(Debug, Default, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "agentId is required"))]
    pub agent_id: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "safeAddress is required"))]
    pub safe_address: Option<String>,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub base_collateral_usd: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 1, max = 86400))]
    pub max_duration_seconds: Option<u64>,
    #[serde(default)]
    pub market: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSessionRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub safe_address: Option<String>,
}

// Response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: String,
    pub agent_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub channel_id: Option<String>,
}

impl From<Session> for StartSessionResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            agent_id: session.agent_id,
            status: session.status,
            started_at: session.started_at,
            channel_id: session.channel_id,
        }
    }
}

/// Most recently opened trade
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastAction {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: TradeSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub size_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_price: Decimal,
}

impl From<&Trade> for LastAction {
    fn from(trade: &Trade) -> Self {
        Self {
            timestamp: trade.opened_at,
            symbol: trade.symbol.clone(),
            side: trade.side,
            size_usd: trade.size_usd,
            entry_price: trade.entry_price,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub channel_id: Option<String>,
    pub settlement_status: ChannelStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub agent_id: String,
    pub status: SessionStatus,
    pub safe_address: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl_usd: Decimal,
    pub pnl_source: PnlSource,
    pub num_trades: usize,
    pub last_action: Option<LastAction>,
    pub trades: Vec<Trade>,
    pub channel: ChannelView,
}

impl From<SessionStatusView> for SessionStatusResponse {
    fn from(view: SessionStatusView) -> Self {
        let last_action = view.trades.iter().max_by_key(|t| t.opened_at).map(LastAction::from);
        Self {
            session_id: view.session.id,
            agent_id: view.session.agent_id,
            status: view.session.status,
            safe_address: view.session.safe_address,
            started_at: view.session.started_at,
            ended_at: view.session.ended_at,
            pnl_usd: view.session.pnl_usd,
            pnl_source: view.pnl_source,
            num_trades: view.trades.len(),
            last_action,
            trades: view.trades,
            channel: ChannelView {
                channel_id: view.channel.channel_id,
                settlement_status: view.channel.settlement_status,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSummary {
    pub num_trades: usize,
    pub win_rate: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopChannelView {
    pub channel_id: Option<String>,
    pub settlement_status: Option<ChannelSettlement>,
    pub settlement_reference: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopSessionResponse {
    pub session_id: String,
    pub agent_id: String,
    pub status: SessionStatus,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(with = "rust_decimal::serde::float")]
    pub final_pnl_usd: Decimal,
    pub pnl_source: Option<PnlSource>,
    pub summary: StopSummary,
    pub channel: StopChannelView,
    pub settlement: Option<SettlementReceipt>,
    /// Empty when the session was already closed
    pub teardown: Vec<TeardownStep>,
}

impl StopSessionResponse {
    pub fn new(outcome: StopOutcome, trades: &[Trade]) -> Self {
        let session = outcome.session;
        let (channel_close, settlement, pnl_source, teardown) = match outcome.report {
            Some(report) => (
                report.channel_close,
                report.receipt,
                Some(report.pnl_source),
                report.steps,
            ),
            None => (None, None, None, Vec::new()),
        };

        Self {
            channel: StopChannelView {
                channel_id: session.channel_id.clone(),
                settlement_status: channel_close.as_ref().map(|c| c.status),
                settlement_reference: channel_close.and_then(|c| c.settlement_reference),
            },
            session_id: session.id,
            agent_id: session.agent_id,
            status: session.status,
            ended_at: session.ended_at,
            final_pnl_usd: session.pnl_usd,
            pnl_source,
            summary: StopSummary {
                num_trades: trades.len(),
                win_rate: trade_win_rate(trades),
            },
            settlement,
            teardown,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub agent_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl_usd: Decimal,
    pub channel_id: Option<String>,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            agent_id: session.agent_id,
            status: session.status,
            started_at: session.started_at,
            ended_at: session.ended_at,
            pnl_usd: session.pnl_usd,
            channel_id: session.channel_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentWithReputation {
    #[serde(flatten)]
    pub agent: Agent,
    pub reputation: Reputation,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAgentsResponse {
    pub agents: Vec<AgentWithReputation>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSession {
    pub session_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl_usd: Decimal,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDetailResponse {
    #[serde(flatten)]
    pub agent: Agent,
    pub reputation: Reputation,
    pub last_sessions: Vec<RecentSession>,
}

pub const RECENT_SESSIONS: usize = 10;

impl AgentDetailResponse {
    pub fn new(agent: Agent, sessions: &[Session]) -> Self {
        let last_sessions = recent_closed(sessions, RECENT_SESSIONS)
            .into_iter()
            .map(|s| RecentSession {
                session_id: s.id.clone(),
                pnl_usd: s.pnl_usd,
                ended_at: s.ended_at,
            })
            .collect();

        Self {
            agent,
            reputation: crate::orchestrator::reputation(sessions),
            last_sessions,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub wallet_address: String,
    pub safe_address: Option<String>,
    pub registered: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub reputation: Reputation,
}

impl MeResponse {
    pub fn registered(user: User, reputation: Reputation) -> Self {
        Self {
            user_id: user.id,
            wallet_address: user.wallet_address,
            safe_address: user.safe_address,
            registered: true,
            created_at: Some(user.created_at),
            reputation,
        }
    }

    /// View of a wallet that has never registered
    pub fn unregistered(wallet_address: &str) -> Self {
        Self {
            user_id: wallet_address.to_lowercase(),
            wallet_address: wallet_address.to_string(),
            safe_address: None,
            registered: false,
            created_at: None,
            reputation: crate::orchestrator::reputation(&[]),
        }
    }
}
