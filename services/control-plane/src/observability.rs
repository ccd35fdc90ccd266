//! Observability: in-process metrics and structured session logging

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Counters and histograms for the orchestrator, shared by clone
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    counters: HashMap<String, u64>,
    histograms: HashMap<String, Vec<f64>>,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                counters: HashMap::new(),
                histograms: HashMap::new(),
                start_time: Instant::now(),
            })),
        }
    }

    /// Increment a counter
    pub async fn increment(&self, name: &str, value: u64) {
        let mut inner = self.inner.write().await;
        *inner.counters.entry(name.to_string()).or_insert(0) += value;
    }

    /// Record a histogram value
    pub async fn histogram(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().await;
        inner
            .histograms
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        MetricsSnapshot {
            counters: inner.counters.clone(),
            histograms: inner
                .histograms
                .iter()
                .map(|(name, values)| (name.clone(), HistogramSummary::of(values)))
                .collect(),
            uptime_secs: inner.start_time.elapsed().as_secs(),
        }
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        let inner = self.inner.read().await;
        inner.counters.get(name).copied().unwrap_or(0)
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub count: usize,
    pub mean: f64,
    pub max: f64,
}

impl HistogramSummary {
    fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                count: 0,
                mean: 0.0,
                max: 0.0,
            };
        }
        Self {
            count: values.len(),
            mean: values.iter().sum::<f64>() / values.len() as f64,
            max: values.iter().copied().fold(f64::MIN, f64::max),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub histograms: HashMap<String, HistogramSummary>,
    pub uptime_secs: u64,
}

/// Structured logger for consistent event formatting
pub struct Logger;

impl Logger {
    /// Log a session lifecycle event
    pub fn session_event(session_id: &str, event_type: &str, details: &str) {
        tracing::info!(
            session_id = %session_id,
            event_type = %event_type,
            details = %details,
            "session_event"
        );
    }
}

/// Metric names
pub mod metrics {
    // Session lifecycle
    pub const SESSION_STARTED: &str = "session_started_total";
    pub const SESSION_STOPPED: &str = "session_stopped_total";
    pub const START_DELEGATION_FAILED: &str = "session_start_delegation_failed_total";
    pub const CHANNEL_OPEN_FAILED: &str = "channel_open_failed_total";

    // Teardown
    pub const TEARDOWN_STEP_FAILED: &str = "teardown_step_failed_total";
    pub const TEARDOWN_DURATION_MS: &str = "teardown_duration_ms";

    // Reconciliation
    pub const RECONCILE_FAILED: &str = "reconcile_failed_total";
    pub const PNL_RECONCILED: &str = "pnl_reconciled_total";
}
