//! Session, trade and owner persistence
//!
//! The orchestrator only sees the [`SessionStore`] trait. `MemoryStore` backs
//! development and tests, `PgStore` backs deployments with a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;

use crate::models::{Session, SessionStatus, Trade, TradeFill, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Db = Pool<Postgres>;

pub async fn init_db(database_url: &str) -> anyhow::Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("duplicate record: {0}")]
    Duplicate(String),
}

/// Partial update of a session record; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub channel_id: Option<String>,
    pub ended_at: Option<DateTime<Utc>>,
    pub pnl_usd: Option<Decimal>,
}

impl SessionPatch {
    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    pub fn pnl_usd(mut self, pnl: Decimal) -> Self {
        self.pnl_usd = Some(pnl);
        self
    }

    pub fn apply(&self, session: &mut Session) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(channel_id) = &self.channel_id {
            session.channel_id = Some(channel_id.clone());
        }
        if let Some(ended_at) = self.ended_at {
            session.ended_at = Some(ended_at);
        }
        if let Some(pnl) = self.pnl_usd {
            session.pnl_usd = pnl;
        }
    }
}

/// Predicate for session scans
#[derive(Debug, Clone, PartialEq)]
pub enum SessionFilter {
    User(String),
    Agent(String),
    Status(SessionStatus),
}

impl SessionFilter {
    pub fn matches(&self, session: &Session) -> bool {
        match self {
            SessionFilter::User(user_id) => &session.user_id == user_id,
            SessionFilter::Agent(agent_id) => &session.agent_id == agent_id,
            SessionFilter::Status(status) => session.status == *status,
        }
    }
}

/// Keyed storage for sessions, trades and owners.
///
/// Implementations serialize concurrent writes per record and must give
/// read-your-writes consistency for a single session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Returns the updated record, or `None` if no session has this id
    async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> Result<Option<Session>, StoreError>;

    /// Matching sessions, newest first
    async fn scan_sessions(&self, filter: SessionFilter) -> Result<Vec<Session>, StoreError>;

    async fn put_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    async fn get_trade(&self, id: &str) -> Result<Option<Trade>, StoreError>;

    /// Sets the fill fields if the trade is still open. Returns the current record.
    async fn close_trade(&self, id: &str, fill: TradeFill) -> Result<Option<Trade>, StoreError>;

    /// Trades of a session ordered by open time, ascending
    async fn trades_for_session(&self, session_id: &str) -> Result<Vec<Trade>, StoreError>;

    async fn put_user(&self, user: &User) -> Result<(), StoreError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// Case-insensitive wallet lookup
    async fn find_user_by_wallet(&self, wallet_address: &str) -> Result<Option<User>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
