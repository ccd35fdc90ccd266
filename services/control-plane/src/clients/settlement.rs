//! Settlement recording
//!
//! A settlement record is the durable final outcome of a session. Recording
//! is idempotent per session: a second record for the same session returns
//! the first receipt unchanged.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

use super::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub session_id: String,
    pub owner_address: String,
    pub agent_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub pnl_usd: Decimal,
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub receipt_id: String,
}

#[async_trait]
pub trait SettlementRecorder: Send + Sync {
    async fn record(&self, record: &SettlementRecord) -> Result<SettlementReceipt, ClientError>;
}

/// In-process settlement ledger keyed by session id
#[derive(Default)]
pub struct LedgerSettlementRecorder {
    entries: RwLock<HashMap<String, (SettlementRecord, SettlementReceipt)>>,
}

impl LedgerSettlementRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session_id: &str) -> Option<SettlementRecord> {
        self.entries
            .read()
            .await
            .get(session_id)
            .map(|(record, _)| record.clone())
    }

    fn receipt_id(record: &SettlementRecord) -> Result<String, ClientError> {
        let canonical = serde_json::to_vec(record)
            .map_err(|e| ClientError::Rejected(format!("unencodable record: {}", e)))?;
        Ok(format!("0x{}", hex::encode(Sha256::digest(&canonical))))
    }
}

#[async_trait]
impl SettlementRecorder for LedgerSettlementRecorder {
    async fn record(&self, record: &SettlementRecord) -> Result<SettlementReceipt, ClientError> {
        if record.owner_address.trim().is_empty() {
            return Err(ClientError::Rejected("owner address is required".to_string()));
        }

        let mut entries = self.entries.write().await;
        if let Some((_, receipt)) = entries.get(&record.session_id) {
            return Ok(receipt.clone());
        }

        let receipt = SettlementReceipt {
            receipt_id: Self::receipt_id(record)?,
        };
        entries.insert(record.session_id.clone(), (record.clone(), receipt.clone()));
        info!(
            session_id = %record.session_id,
            receipt_id = %receipt.receipt_id,
            pnl_usd = %record.pnl_usd,
            "settlement recorded"
        );

        Ok(receipt)
    }
}
