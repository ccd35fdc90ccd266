//! Postgres-backed store

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{Db, SessionFilter, SessionPatch, SessionStore, StoreError};
use crate::models::{
    bigdecimal_from_decimal, decimal_from_bigdecimal, Session, SessionStatus, Trade, TradeFill,
    TradeSide, User,
};

/// Session row (uses BigDecimal for SQLx compatibility)
#[derive(Debug, Clone, FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    agent_id: String,
    safe_address: String,
    channel_id: Option<String>,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    pnl_usd: BigDecimal,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            agent_id: row.agent_id,
            safe_address: row.safe_address,
            channel_id: row.channel_id,
            status: row.status,
            started_at: row.started_at,
            ended_at: row.ended_at,
            pnl_usd: decimal_from_bigdecimal(row.pnl_usd),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct TradeRow {
    id: String,
    session_id: String,
    symbol: String,
    side: TradeSide,
    size_usd: BigDecimal,
    entry_price: BigDecimal,
    exit_price: Option<BigDecimal>,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    pnl_usd: Option<BigDecimal>,
}

impl From<TradeRow> for Trade {
    fn from(row: TradeRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            symbol: row.symbol,
            side: row.side,
            size_usd: decimal_from_bigdecimal(row.size_usd),
            entry_price: decimal_from_bigdecimal(row.entry_price),
            exit_price: row.exit_price.map(decimal_from_bigdecimal),
            opened_at: row.opened_at,
            closed_at: row.closed_at,
            pnl_usd: row.pnl_usd.map(decimal_from_bigdecimal),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: String,
    wallet_address: String,
    safe_address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            wallet_address: row.wallet_address,
            safe_address: row.safe_address,
            created_at: row.created_at,
        }
    }
}

/// Map unique violations to `StoreError::Duplicate`
fn insert_error(e: sqlx::Error, key: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(key.to_string())
        }
        _ => StoreError::Database(e),
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: Db,
}

impl PgStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, user_id, agent_id, safe_address, channel_id, status,
                started_at, ended_at, pnl_usd
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.agent_id)
        .bind(&session.safe_address)
        .bind(&session.channel_id)
        .bind(session.status)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(bigdecimal_from_decimal(session.pnl_usd))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, &session.id))?;

        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Session::from))
    }

    async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            UPDATE sessions SET
                status = COALESCE($2, status),
                channel_id = COALESCE($3, channel_id),
                ended_at = COALESCE($4, ended_at),
                pnl_usd = COALESCE($5, pnl_usd)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(patch.status)
        .bind(patch.channel_id)
        .bind(patch.ended_at)
        .bind(patch.pnl_usd.map(bigdecimal_from_decimal))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    async fn scan_sessions(&self, filter: SessionFilter) -> Result<Vec<Session>, StoreError> {
        let query = match &filter {
            SessionFilter::User(user_id) => sqlx::query_as::<_, SessionRow>(
                "SELECT * FROM sessions WHERE user_id = $1 ORDER BY started_at DESC, id",
            )
            .bind(user_id.clone()),
            SessionFilter::Agent(agent_id) => sqlx::query_as::<_, SessionRow>(
                "SELECT * FROM sessions WHERE agent_id = $1 ORDER BY started_at DESC, id",
            )
            .bind(agent_id.clone()),
            SessionFilter::Status(status) => sqlx::query_as::<_, SessionRow>(
                "SELECT * FROM sessions WHERE status = $1 ORDER BY started_at DESC, id",
            )
            .bind(*status),
        };

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    async fn put_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, session_id, symbol, side, size_usd, entry_price,
                exit_price, opened_at, closed_at, pnl_usd
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.session_id)
        .bind(&trade.symbol)
        .bind(trade.side)
        .bind(bigdecimal_from_decimal(trade.size_usd))
        .bind(bigdecimal_from_decimal(trade.entry_price))
        .bind(trade.exit_price.map(bigdecimal_from_decimal))
        .bind(trade.opened_at)
        .bind(trade.closed_at)
        .bind(trade.pnl_usd.map(bigdecimal_from_decimal))
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, &trade.id))?;

        Ok(())
    }

    async fn get_trade(&self, id: &str) -> Result<Option<Trade>, StoreError> {
        let row = sqlx::query_as::<_, TradeRow>("SELECT * FROM trades WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Trade::from))
    }

    async fn close_trade(&self, id: &str, fill: TradeFill) -> Result<Option<Trade>, StoreError> {
        let closed = sqlx::query_as::<_, TradeRow>(
            r#"
            UPDATE trades SET exit_price = $2, closed_at = $3, pnl_usd = $4
            WHERE id = $1 AND closed_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(bigdecimal_from_decimal(fill.exit_price))
        .bind(fill.closed_at)
        .bind(bigdecimal_from_decimal(fill.pnl_usd))
        .fetch_optional(&self.pool)
        .await?;

        match closed {
            Some(row) => Ok(Some(row.into())),
            // Already closed (or unknown): report what is stored
            None => self.get_trade(id).await,
        }
    }

    async fn trades_for_session(&self, session_id: &str) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query_as::<_, TradeRow>(
            "SELECT * FROM trades WHERE session_id = $1 ORDER BY opened_at ASC, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Trade::from).collect())
    }

    async fn put_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, wallet_address, safe_address, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&user.id)
        .bind(&user.wallet_address)
        .bind(&user.safe_address)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, &user.wallet_address))?;

        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn find_user_by_wallet(&self, wallet_address: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT * FROM users WHERE LOWER(wallet_address) = LOWER($1)",
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
