use serde::Serialize;

use crate::account::Account;
use crate::algorithms::{QuotaMode, SlidingWindow};
use crate::metrics::{GateMetrics, MetricsSnapshot};

#[derive(Debug, Serialize)]
pub struct UsageCountResponse {
    pub key: String,
    pub count: u64,
    pub window: SlidingWindow,
}

impl UsageCountResponse {
    pub fn new(key: String, count: u64, window: SlidingWindow) -> Self {
        Self { key, count, window }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub message: String,
    pub account: Account,
}

impl AccountResponse {
    pub fn created(account: Account) -> Self {
        Self {
            message: "Account created".to_string(),
            account,
        }
    }

    pub fn current(account: Account) -> Self {
        Self {
            message: "Current account".to_string(),
            account,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub quota_mode: QuotaMode,
    pub window: SlidingWindow,
}

impl ReadinessResponse {
    pub fn new(ready: bool, quota_mode: QuotaMode, window: SlidingWindow) -> Self {
        Self {
            status: if ready { "ready" } else { "not_ready" }.to_string(),
            quota_mode,
            window,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct KeyMetricsResponse {
    pub key: String,
    pub metrics: GateMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::RequestQuota;

    #[test]
    fn test_usage_count_shape() {
        let response = UsageCountResponse::new("k".into(), 3, SlidingWindow::from_millis(60_000));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["count"], 3);
        assert_eq!(value["window"]["width"], "1m");
    }

    #[test]
    fn test_readiness_shape() {
        let response = ReadinessResponse::new(false, QuotaMode::Strict, SlidingWindow::default());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "not_ready");
        assert_eq!(value["quota_mode"], "strict");
    }

    #[test]
    fn test_account_response_shape() {
        let account = Account::new("k", "n", false, RequestQuota::Unlimited);
        let value = serde_json::to_value(AccountResponse::created(account)).unwrap();
        assert_eq!(value["account"]["request_quota"], -1);
    }
}
