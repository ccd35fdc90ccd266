//! Reputation derived from closed sessions. Pure functions over persisted data.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{Session, SessionStatus, Trade};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reputation {
    /// Closed sessions counted
    pub sessions: usize,
    pub win_rate: f64,
    #[serde(with = "rust_decimal::serde::float")]
    pub avg_pnl_usd: Decimal,
}

/// Aggregate over the closed sessions in `sessions`; others are ignored
pub fn reputation(sessions: &[Session]) -> Reputation {
    let closed: Vec<&Session> = sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Closed)
        .collect();

    if closed.is_empty() {
        return Reputation {
            sessions: 0,
            win_rate: 0.0,
            avg_pnl_usd: Decimal::ZERO,
        };
    }

    let count = closed.len();
    let wins = closed.iter().filter(|s| s.pnl_usd > Decimal::ZERO).count();
    let total: Decimal = closed.iter().map(|s| s.pnl_usd).sum();

    Reputation {
        sessions: count,
        win_rate: wins as f64 / count as f64,
        avg_pnl_usd: total / Decimal::from(count),
    }
}

/// Closed sessions, most recently ended first, at most `limit`
pub fn recent_closed(sessions: &[Session], limit: usize) -> Vec<&Session> {
    let mut closed: Vec<&Session> = sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Closed)
        .collect();
    closed.sort_by(|a, b| b.ended_at.cmp(&a.ended_at).then_with(|| a.id.cmp(&b.id)));
    closed.truncate(limit);
    closed
}

/// Share of trades with positive PnL; open trades count as not winning
pub fn trade_win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades
        .iter()
        .filter(|t| t.pnl_usd.is_some_and(|p| p > Decimal::ZERO))
        .count();
    wins as f64 / trades.len() as f64
}
