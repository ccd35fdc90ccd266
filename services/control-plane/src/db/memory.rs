//! In-process store (per-process, not durable)

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{SessionFilter, SessionPatch, SessionStore, StoreError};
use crate::models::{Session, Trade, TradeFill, User};

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    trades: RwLock<HashMap<String, Trade>>,
    users: RwLock<HashMap<String, User>>,
    /// lowercase wallet -> user id
    wallets: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::Duplicate(session.id.clone()));
        }
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(id).map(|session| {
            patch.apply(session);
            session.clone()
        }))
    }

    async fn scan_sessions(&self, filter: SessionFilter) -> Result<Vec<Session>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut matched: Vec<Session> = sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn put_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let mut trades = self.trades.write().await;
        if trades.contains_key(&trade.id) {
            return Err(StoreError::Duplicate(trade.id.clone()));
        }
        trades.insert(trade.id.clone(), trade.clone());
        Ok(())
    }

    async fn get_trade(&self, id: &str) -> Result<Option<Trade>, StoreError> {
        Ok(self.trades.read().await.get(id).cloned())
    }

    async fn close_trade(&self, id: &str, fill: TradeFill) -> Result<Option<Trade>, StoreError> {
        let mut trades = self.trades.write().await;
        Ok(trades.get_mut(id).map(|trade| {
            trade.close(&fill);
            trade.clone()
        }))
    }

    async fn trades_for_session(&self, session_id: &str) -> Result<Vec<Trade>, StoreError> {
        let trades = self.trades.read().await;
        let mut matched: Vec<Trade> = trades
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let key = user.wallet_address.to_lowercase();
        let mut wallets = self.wallets.write().await;
        if let Some(existing) = wallets.get(&key) {
            if existing != &user.id {
                return Err(StoreError::Duplicate(user.wallet_address.clone()));
            }
        }
        wallets.insert(key, user.id.clone());
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_user_by_wallet(&self, wallet_address: &str) -> Result<Option<User>, StoreError> {
        let user_id = match self.wallets.read().await.get(&wallet_address.to_lowercase()) {
            Some(id) => id.clone(),
            None => return Ok(None),
        };
        self.get_user(&user_id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
