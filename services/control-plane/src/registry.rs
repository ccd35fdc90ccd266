//! Agent catalog
//!
//! Agents are provisioned out of band and read-only at runtime. The catalog
//! is built once at startup, from a JSON file when one is configured.

use anyhow::{bail, Context};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::path::Path;

use crate::models::{Agent, RiskProfile};

#[derive(Debug, Clone, PartialEq)]
pub struct AgentCatalog {
    agents: Vec<Agent>,
}

impl AgentCatalog {
    pub fn new(agents: Vec<Agent>) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();
        for agent in &agents {
            if agent.id.trim().is_empty() {
                bail!("agent id must not be empty");
            }
            if !seen.insert(agent.id.as_str()) {
                bail!("duplicate agent id: {}", agent.id);
            }
            if agent.markets.is_empty() {
                bail!("agent {} has no markets", agent.id);
            }
            if agent.payout_address.trim().is_empty() {
                bail!("agent {} has no payout address", agent.id);
            }
        }
        Ok(Self { agents })
    }

    /// Load a JSON array of agents
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading agent catalog {}", path.display()))?;
        let agents: Vec<Agent> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing agent catalog {}", path.display()))?;
        Self::new(agents)
    }

    pub fn builtin() -> Self {
        Self {
            agents: vec![
                Agent {
                    id: "trend-bandit-v1".to_string(),
                    name: "Trend Bandit v1".to_string(),
                    description: "Momentum-based futures agent using contextual bandit exploration. \
                        Analyzes recent price trends and volatility to make LONG/SHORT decisions on BTC perp."
                        .to_string(),
                    payout_address: "0x0000000000000000000000000000000000000001".to_string(),
                    risk_profile: RiskProfile {
                        max_leverage: 5,
                        max_position_usd: Decimal::from(100),
                        max_daily_loss_usd: Decimal::from(50),
                    },
                    learning_mode: "bandit-trend".to_string(),
                    markets: vec!["BTCUSDT_PERP".to_string()],
                },
                Agent {
                    id: "mean-reversion-v1".to_string(),
                    name: "Mean Reversion v1".to_string(),
                    description: "Mean reversion strategy agent that identifies overextended price moves \
                        and trades against the trend. Uses bandit learning to optimize entry/exit timing."
                        .to_string(),
                    payout_address: "0x0000000000000000000000000000000000000002".to_string(),
                    risk_profile: RiskProfile {
                        max_leverage: 3,
                        max_position_usd: Decimal::from(75),
                        max_daily_loss_usd: Decimal::from(30),
                    },
                    learning_mode: "bandit-mean-reversion".to_string(),
                    markets: vec!["BTCUSDT_PERP".to_string(), "ETHUSDT_PERP".to_string()],
                },
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn all(&self) -> &[Agent] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
