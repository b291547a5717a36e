use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::algorithms::DecisionReason;
use crate::gate::AuthorizationDecision;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateMetrics {
    pub total_requests: u64,
    pub allowed_requests: u64,
    pub denied_requests: u64,
    pub quota_exceeded: u64,
    pub missing_key: u64,
    /// Allowed requests whose usage event could not be stored.
    pub record_failures: u64,
    pub last_reset: u64,
}

impl Default for GateMetrics {
    fn default() -> Self {
        Self {
            total_requests: 0,
            allowed_requests: 0,
            denied_requests: 0,
            quota_exceeded: 0,
            missing_key: 0,
            record_failures: 0,
            last_reset: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

impl GateMetrics {
    fn observe(&mut self, decision: &AuthorizationDecision) {
        self.total_requests += 1;
        if decision.allowed {
            self.allowed_requests += 1;
            if !decision.usage_recorded {
                self.record_failures += 1;
            }
            return;
        }

        self.denied_requests += 1;
        match decision.reason {
            DecisionReason::QuotaExceeded => self.quota_exceeded += 1,
            DecisionReason::MissingKey => self.missing_key += 1,
            _ => {}
        }
    }

    fn absorb(&mut self, other: &GateMetrics) {
        self.total_requests += other.total_requests;
        self.allowed_requests += other.allowed_requests;
        self.denied_requests += other.denied_requests;
        self.quota_exceeded += other.quota_exceeded;
        self.missing_key += other.missing_key;
        self.record_failures += other.record_failures;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub global: GateMetrics,
    pub tracked_keys: usize,
}

/// In-process counters of gate outcomes.
///
/// Only keys that resolved to an account get their own entry. Missing,
/// unknown and otherwise unauthorized keys share one unattributed bucket, so
/// the per-key map is bounded by the account registry.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    key_metrics: Arc<RwLock<HashMap<String, GateMetrics>>>,
    unattributed: Arc<RwLock<GateMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_decision(&self, key: &str, decision: &AuthorizationDecision) {
        let resolved = matches!(
            decision.reason,
            DecisionReason::Granted | DecisionReason::QuotaExceeded
        );
        if !resolved {
            self.unattributed.write().await.observe(decision);
            return;
        }

        let mut metrics = self.key_metrics.write().await;
        metrics.entry(key.to_string()).or_default().observe(decision);
    }

    pub async fn get_key_metrics(&self, key: &str) -> Option<GateMetrics> {
        let metrics = self.key_metrics.read().await;
        metrics.get(key).cloned()
    }

    pub async fn get_global_metrics(&self) -> GateMetrics {
        let mut global = GateMetrics::default();
        global.absorb(&*self.unattributed.read().await);

        let metrics = self.key_metrics.read().await;
        for key_metrics in metrics.values() {
            global.absorb(key_metrics);
        }

        global
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            global: self.get_global_metrics().await,
            tracked_keys: self.key_metrics.read().await.len(),
        }
    }
}
