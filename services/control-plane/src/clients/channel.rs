//! Off-chain settlement channels

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::ClientError;

/// An opened channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelHandle {
    pub channel_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSettlement {
    Settled,
    Unsettled,
}

/// Outcome of closing a channel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelClose {
    pub status: ChannelSettlement,
    pub settlement_reference: Option<String>,
}

#[async_trait]
pub trait ChannelService: Send + Sync {
    /// Open a channel between two parties. Callers treat failure as fatal.
    async fn open(&self, party_a: &str, party_b: &str) -> Result<ChannelHandle, ClientError>;

    /// Close a channel and realize final balances. Callers tolerate failure.
    async fn close(&self, channel_id: &str) -> Result<ChannelClose, ClientError>;
}

#[derive(Debug, Clone)]
struct ChannelEntry {
    party_a: String,
    party_b: String,
    closed: Option<ChannelClose>,
}

/// In-process channel ledger
#[derive(Default)]
pub struct LocalChannelService {
    channels: RwLock<HashMap<String, ChannelEntry>>,
}

impl LocalChannelService {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel_id(party_a: &str) -> String {
        let digits: String = party_a
            .trim_start_matches("0x")
            .chars()
            .filter(|c| c.is_ascii_hexdigit())
            .take(8)
            .collect::<String>()
            .to_lowercase();
        format!("nl_{}_{}", Utc::now().timestamp_millis(), digits)
    }

    fn settlement_reference(channel_id: &str, entry: &ChannelEntry) -> String {
        let mut hasher = Sha256::new();
        hasher.update(channel_id.as_bytes());
        hasher.update(entry.party_a.as_bytes());
        hasher.update(entry.party_b.as_bytes());
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl ChannelService for LocalChannelService {
    async fn open(&self, party_a: &str, party_b: &str) -> Result<ChannelHandle, ClientError> {
        let (party_a, party_b) = (party_a.trim(), party_b.trim());
        if party_a.is_empty() || party_b.is_empty() {
            return Err(ClientError::Rejected("channel parties must be non-empty".to_string()));
        }
        if party_a.eq_ignore_ascii_case(party_b) {
            return Err(ClientError::Rejected(
                "channel parties must be distinct".to_string(),
            ));
        }

        let mut channels = self.channels.write().await;
        let mut channel_id = Self::channel_id(party_a);
        let mut suffix = 1;
        while channels.contains_key(&channel_id) {
            channel_id = format!("{}_{}", Self::channel_id(party_a), suffix);
            suffix += 1;
        }

        channels.insert(
            channel_id.clone(),
            ChannelEntry {
                party_a: party_a.to_string(),
                party_b: party_b.to_string(),
                closed: None,
            },
        );
        debug!(channel_id = %channel_id, "channel opened");

        Ok(ChannelHandle { channel_id })
    }

    async fn close(&self, channel_id: &str) -> Result<ChannelClose, ClientError> {
        let mut channels = self.channels.write().await;
        let entry = channels
            .get_mut(channel_id)
            .ok_or_else(|| ClientError::Rejected(format!("unknown channel {}", channel_id)))?;

        if let Some(closed) = &entry.closed {
            return Ok(closed.clone());
        }

        let close = ChannelClose {
            status: ChannelSettlement::Settled,
            settlement_reference: Some(Self::settlement_reference(channel_id, entry)),
        };
        entry.closed = Some(close.clone());
        debug!(channel_id = %channel_id, "channel closed");

        Ok(close)
    }
}
