//! Execution service client
//!
//! The execution service runs the actual trading loop for a session once told
//! to start, reports live PnL and trade activity, and can be told to stop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::ClientError;
use crate::models::{StopReason, TradeSide};

/// Delegation request sent when a session starts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStart {
    pub session_id: String,
    pub agent_id: String,
    pub owner_address: String,
    pub safe_address: String,
    pub market: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub base_collateral_usd: Decimal,
    pub max_duration_seconds: u64,
}

/// Live view of a running session
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub pnl_usd: Option<Decimal>,
    /// Reports that do not parse are dropped so PnL still reconciles
    #[serde(default, deserialize_with = "well_formed_trades")]
    pub trades: Vec<TradeReport>,
}

fn well_formed_trades<'de, D>(deserializer: D) -> Result<Vec<TradeReport>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "skipping malformed trade report");
                None
            }
        })
        .collect())
}

/// A trade as reported by the execution service
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeReport {
    pub id: String,
    pub symbol: String,
    pub side: TradeSide,
    #[serde(with = "rust_decimal::serde::float")]
    pub size_usd: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_price: Decimal,
    pub opened_at: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub exit_price: Option<Decimal>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(with = "rust_decimal::serde::float_option", default)]
    pub pnl_usd: Option<Decimal>,
}

#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn start(&self, request: &ExecutionStart) -> Result<(), ClientError>;

    async fn stop(&self, session_id: &str, reason: StopReason) -> Result<(), ClientError>;

    async fn status(&self, session_id: &str) -> Result<ExecutionStatus, ClientError>;
}

#[derive(Debug, Clone, Serialize)]
struct StopRequest<'a> {
    reason: &'a str,
}

/// HTTP client for the execution service's internal session API
pub struct HttpExecutionClient {
    client: Client,
    base_url: String,
}

impl HttpExecutionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Status { status, body })
        }
    }
}

#[async_trait]
impl ExecutionService for HttpExecutionClient {
    async fn start(&self, request: &ExecutionStart) -> Result<(), ClientError> {
        let url = format!("{}/internal/sessions/start", self.base_url);
        debug!(session_id = %request.session_id, "delegating session to execution service");

        let response = self.client.post(&url).json(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn stop(&self, session_id: &str, reason: StopReason) -> Result<(), ClientError> {
        let url = format!("{}/internal/sessions/{}/stop", self.base_url, session_id);

        let response = self
            .client
            .post(&url)
            .json(&StopRequest {
                reason: reason.as_str(),
            })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn status(&self, session_id: &str) -> Result<ExecutionStatus, ClientError> {
        let url = format!("{}/internal/sessions/{}/status", self.base_url, session_id);

        let response = self.client.get(&url).send().await?;
        let status: ExecutionStatus = Self::check(response).await?.json().await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpExecutionClient {
        HttpExecutionClient::new(&server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_start_posts_delegation_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/sessions/start"))
            .and(body_json(json!({
                "sessionId": "sess_1",
                "agentId": "trend-bandit-v1",
                "ownerAddress": "0xowner",
                "safeAddress": "0xsafe",
                "market": "BTCUSDT_PERP",
                "baseCollateralUsd": 50.0,
                "maxDurationSeconds": 600
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let request = ExecutionStart {
            session_id: "sess_1".to_string(),
            agent_id: "trend-bandit-v1".to_string(),
            owner_address: "0xowner".to_string(),
            safe_address: "0xsafe".to_string(),
            market: "BTCUSDT_PERP".to_string(),
            base_collateral_usd: dec!(50),
            max_duration_seconds: 600,
        };
        client(&server).start(&request).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_sends_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/sessions/sess_2/stop"))
            .and(body_json(json!({"reason": "risk_limit"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .stop("sess_2", StopReason::RiskLimit)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_parses_pnl_and_trades() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/sessions/sess_3/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pnlUsd": 12.5,
                "trades": [{
                    "id": "t-1",
                    "symbol": "BTCUSDT_PERP",
                    "side": "LONG",
                    "sizeUsd": 25,
                    "entryPrice": 64000.5,
                    "openedAt": "2026-01-01T00:00:00Z"
                }]
            })))
            .mount(&server)
            .await;

        let status = client(&server).status("sess_3").await.unwrap();
        assert_eq!(status.pnl_usd, Some(dec!(12.5)));
        assert_eq!(status.trades.len(), 1);
        assert_eq!(status.trades[0].side, TradeSide::Long);
        assert!(status.trades[0].closed_at.is_none());
    }

    #[tokio::test]
    async fn test_status_skips_malformed_trades() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/sessions/sess_5/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pnlUsd": -4.25,
                "trades": [
                    {"id": "t-bad", "side": "SIDEWAYS"},
                    {
                        "id": "t-2",
                        "symbol": "ETHUSDT_PERP",
                        "side": "SHORT",
                        "sizeUsd": 10,
                        "entryPrice": 3100,
                        "openedAt": "2026-01-01T00:00:00Z"
                    },
                    "garbage"
                ]
            })))
            .mount(&server)
            .await;

        let status = client(&server).status("sess_5").await.unwrap();
        assert_eq!(status.pnl_usd, Some(dec!(-4.25)));
        assert_eq!(status.trades.len(), 1);
        assert_eq!(status.trades[0].id, "t-2");
    }

    #[test]
    fn test_null_trades_is_empty() {
        let status: ExecutionStatus =
            serde_json::from_value(json!({"pnlUsd": 1.0, "trades": null})).unwrap();
        assert!(status.trades.is_empty());
        assert_eq!(status.pnl_usd, Some(dec!(1)));
    }

    #[tokio::test]
    async fn test_status_without_pnl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/sessions/sess_4/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let status = client(&server).status("sess_4").await.unwrap();
        assert_eq!(status, ExecutionStatus::default());
    }

    #[tokio::test]
    async fn test_non_success_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/internal/sessions/start"))
            .respond_with(ResponseTemplate::new(503).set_body_string("draining"))
            .mount(&server)
            .await;

        let request = ExecutionStart {
            session_id: "sess_5".to_string(),
            agent_id: "a".to_string(),
            owner_address: "0xowner".to_string(),
            safe_address: "0xsafe".to_string(),
            market: "BTCUSDT_PERP".to_string(),
            base_collateral_usd: dec!(10),
            max_duration_seconds: 60,
        };
        match client(&server).start(&request).await {
            Err(ClientError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "draining");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        // Nothing listens on port 9 (discard) on the test host
        let client = HttpExecutionClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(client.status("sess_6").await.is_err());
    }
}
