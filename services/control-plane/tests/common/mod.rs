//! Scripted collaborators for orchestrator and HTTP tests
#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use session_control_plane::clients::{
    ChannelClose, ChannelHandle, ChannelService, ChannelSettlement, ClientError,
    ExecutionService, ExecutionStart, ExecutionStatus, SettlementReceipt, SettlementRecord,
    SettlementRecorder, TradeReport,
};
use session_control_plane::db::{
    MemoryStore, SessionFilter, SessionPatch, SessionStore, StoreError,
};
use session_control_plane::models::{Session, StopReason, Trade, TradeFill, User};
use session_control_plane::orchestrator::CallTimeouts;
use session_control_plane::retry::RetryConfig;
use session_control_plane::{
    AgentCatalog, AppState, MetricsCollector, SessionDefaults, SessionOrchestrator,
};

pub const OWNER_WALLET: &str = "0xOwnerWallet0000000000000000000000000001";
pub const SAFE_ADDRESS: &str = "0x5afe000000000000000000000000000000000001";

/// Memory store that can be told to fail session inserts
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_put_session: AtomicBool,
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn put_session(&self, session: &Session) -> Result<(), StoreError> {
        if self.fail_put_session.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.put_session(session).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.inner.get_session(id).await
    }

    async fn update_session(
        &self,
        id: &str,
        patch: SessionPatch,
    ) -> Result<Option<Session>, StoreError> {
        self.inner.update_session(id, patch).await
    }

    async fn scan_sessions(&self, filter: SessionFilter) -> Result<Vec<Session>, StoreError> {
        self.inner.scan_sessions(filter).await
    }

    async fn put_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        self.inner.put_trade(trade).await
    }

    async fn get_trade(&self, id: &str) -> Result<Option<Trade>, StoreError> {
        self.inner.get_trade(id).await
    }

    async fn close_trade(&self, id: &str, fill: TradeFill) -> Result<Option<Trade>, StoreError> {
        self.inner.close_trade(id, fill).await
    }

    async fn trades_for_session(&self, session_id: &str) -> Result<Vec<Trade>, StoreError> {
        self.inner.trades_for_session(session_id).await
    }

    async fn put_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.put_user(user).await
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.inner.get_user(id).await
    }

    async fn find_user_by_wallet(&self, wallet_address: &str) -> Result<Option<User>, StoreError> {
        self.inner.find_user_by_wallet(wallet_address).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

#[derive(Default)]
pub struct FakeChannels {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_open: AtomicBool,
    pub fail_close: AtomicBool,
    /// Open fails this many times before succeeding
    pub open_failures_before_success: AtomicUsize,
    pub opened_between: Mutex<Vec<(String, String)>>,
    pub closed: Mutex<Vec<String>>,
}

#[async_trait]
impl ChannelService for FakeChannels {
    async fn open(&self, party_a: &str, party_b: &str) -> Result<ChannelHandle, ClientError> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("channel node down".into()));
        }
        if n <= self.open_failures_before_success.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable(format!("transient failure {}", n)));
        }
        self.opened_between
            .lock()
            .unwrap()
            .push((party_a.to_string(), party_b.to_string()));
        Ok(ChannelHandle {
            channel_id: format!("ch_{}", n),
        })
    }

    async fn close(&self, channel_id: &str) -> Result<ChannelClose, ClientError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        self.closed.lock().unwrap().push(channel_id.to_string());
        Ok(ChannelClose {
            status: ChannelSettlement::Settled,
            settlement_reference: Some(format!("0xref_{}", channel_id)),
        })
    }
}

#[derive(Default)]
pub struct FakeExecution {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_status: AtomicBool,
    pub start_delay: Mutex<Option<Duration>>,
    pub status_delay: Mutex<Option<Duration>>,
    pub pnl: Mutex<Option<Decimal>>,
    pub trades: Mutex<Vec<TradeReport>>,
    pub last_start: Mutex<Option<ExecutionStart>>,
    pub last_stop_reason: Mutex<Option<StopReason>>,
}

impl FakeExecution {
    pub fn set_pnl(&self, pnl: Decimal) {
        *self.pnl.lock().unwrap() = Some(pnl);
    }

    pub fn set_trades(&self, trades: Vec<TradeReport>) {
        *self.trades.lock().unwrap() = trades;
    }

    pub fn calls(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
            + self.stops.load(Ordering::SeqCst)
            + self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionService for FakeExecution {
    async fn start(&self, request: &ExecutionStart) -> Result<(), ClientError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.last_start.lock().unwrap() = Some(request.clone());
        let delay = *self.start_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                status: 503,
                body: "no capacity".into(),
            });
        }
        Ok(())
    }

    async fn stop(&self, _session_id: &str, reason: StopReason) -> Result<(), ClientError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.last_stop_reason.lock().unwrap() = Some(reason);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("execution service unreachable".into()));
        }
        Ok(())
    }

    async fn status(&self, _session_id: &str) -> Result<ExecutionStatus, ClientError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(ClientError::Unavailable("execution service unreachable".into()));
        }
        Ok(ExecutionStatus {
            pnl_usd: *self.pnl.lock().unwrap(),
            trades: self.trades.lock().unwrap().clone(),
        })
    }
}

#[derive(Default)]
pub struct FakeSettlement {
    pub records: AtomicUsize,
    pub fail: AtomicBool,
    pub recorded: Mutex<Vec<SettlementRecord>>,
}

#[async_trait]
impl SettlementRecorder for FakeSettlement {
    async fn record(&self, record: &SettlementRecord) -> Result<SettlementReceipt, ClientError> {
        self.records.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::Rejected("ledger offline".into()));
        }
        self.recorded.lock().unwrap().push(record.clone());
        Ok(SettlementReceipt {
            receipt_id: format!("0xreceipt_{}", record.session_id),
        })
    }
}

pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub agents: Arc<AgentCatalog>,
    pub channels: Arc<FakeChannels>,
    pub execution: Arc<FakeExecution>,
    pub settlement: Arc<FakeSettlement>,
    pub metrics: MetricsCollector,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub owner: User,
}

pub fn fast_timeouts() -> CallTimeouts {
    let t = Duration::from_millis(200);
    CallTimeouts {
        channel_open: t,
        channel_close: t,
        execution: t,
        settlement: t,
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_retry(RetryConfig::none()).await
    }

    pub async fn with_retry(retry: RetryConfig) -> Self {
        let store = Arc::new(FlakyStore::default());
        let agents = Arc::new(AgentCatalog::builtin());
        let channels = Arc::new(FakeChannels::default());
        let execution = Arc::new(FakeExecution::default());
        let settlement = Arc::new(FakeSettlement::default());
        let metrics = MetricsCollector::new();

        let owner = User::new(OWNER_WALLET, Some(SAFE_ADDRESS.to_string()));
        store.put_user(&owner).await.unwrap();

        let orchestrator = SessionOrchestrator::new(
            store.clone(),
            agents.clone(),
            channels.clone(),
            execution.clone(),
            settlement.clone(),
        )
        .with_timeouts(fast_timeouts())
        .with_retry(retry)
        .with_metrics(metrics.clone());

        Self {
            store,
            agents,
            channels,
            execution,
            settlement,
            metrics,
            orchestrator: Arc::new(orchestrator),
            owner,
        }
    }

    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            store: self.store.clone(),
            agents: self.agents.clone(),
            orchestrator: self.orchestrator.clone(),
            metrics: self.metrics.clone(),
            session_defaults: SessionDefaults::default(),
        })
    }
}
