use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod api;

/// Lifecycle status of a trading session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "session_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Closing,
    Closed,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Closing => "closing",
            SessionStatus::Closed => "closed",
            SessionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session is being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    UserRequested,
    Timeout,
    RiskLimit,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::UserRequested => "user_requested",
            StopReason::Timeout => "timeout",
            StopReason::RiskLimit => "risk_limit",
        }
    }
}

impl std::str::FromStr for StopReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_requested" => Ok(StopReason::UserRequested),
            "timeout" => Ok(StopReason::Timeout),
            "risk_limit" => Ok(StopReason::RiskLimit),
            other => Err(format!("unknown stop reason: {}", other)),
        }
    }
}

/// A bounded delegation of capital from an owner to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub agent_id: String,
    /// Capital source the channel is opened from
    pub safe_address: String,
    pub channel_id: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    /// Set exactly once, on the terminal transition
    pub ended_at: Option<DateTime<Utc>>,
    /// Last observed cumulative PnL
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl_usd: Decimal,
}

impl Session {
    /// Fresh `pending` record for a channel that has just been opened
    pub fn pending(user_id: &str, agent_id: &str, safe_address: &str, channel_id: String) -> Self {
        Self {
            id: format!("sess_{}", Uuid::new_v4()),
            user_id: user_id.to_string(),
            agent_id: agent_id.to_string(),
            safe_address: safe_address.to_string(),
            channel_id: Some(channel_id),
            status: SessionStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            pnl_usd: Decimal::ZERO,
        }
    }
}

/// Direction of a futures position
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "trade_side", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Long,
    Short,
}

/// A single position opened within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: String,
    pub session_id: String,
    pub symbol: String,
    pub side: TradeSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub size_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub exit_price: Option<Decimal>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub pnl_usd: Option<Decimal>,
}

impl Trade {
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Set the terminal fill fields. Returns false if the trade was already closed.
    pub fn close(&mut self, fill: &TradeFill) -> bool {
        if self.is_closed() {
            return false;
        }
        self.exit_price = Some(fill.exit_price);
        self.closed_at = Some(fill.closed_at);
        self.pnl_usd = Some(fill.pnl_usd);
        true
    }
}

/// Terminal fill of a trade
#[derive(Debug, Clone, PartialEq)]
pub struct TradeFill {
    pub exit_price: Decimal,
    pub closed_at: DateTime<Utc>,
    pub pnl_usd: Decimal,
}

/// Informational risk bounds, enforced by the execution service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskProfile {
    pub max_leverage: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub max_position_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub max_daily_loss_usd: Decimal,
}

/// Statically provisioned execution profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(alias = "revenueWallet")]
    pub payout_address: String,
    pub risk_profile: RiskProfile,
    #[serde(default)]
    pub learning_mode: String,
    pub markets: Vec<String>,
}

/// Owner identity, keyed by wallet address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub wallet_address: String,
    pub safe_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(wallet_address: &str, safe_address: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            wallet_address: wallet_address.to_string(),
            safe_address,
            created_at: Utc::now(),
        }
    }
}

// Helper conversions between BigDecimal and Decimal
pub fn decimal_from_bigdecimal(bd: BigDecimal) -> Decimal {
    bd.to_string().parse().unwrap_or_default()
}

pub fn bigdecimal_from_decimal(d: Decimal) -> BigDecimal {
    d.to_string().parse().unwrap_or_default()
}
