use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

use crate::account::{Account, NewAccount};
use crate::algorithms::{DecisionReason, RequestQuota, SlidingWindow};
use crate::clock::Clock;
use crate::directory::AccountStore;
use crate::error::{DirectoryError, KeygateError, Result};
use crate::gate::{AuthorizationDecision, AuthorizationGate};
use crate::metrics::{GateMetrics, MetricsCollector};
use crate::usage::UsageStore;

/// Entry point used by the HTTP layer.
///
/// Turns gate decisions into `Ok(())` or a `KeygateError` and fronts the
/// account registry and request-counter operations.
#[derive(Clone)]
pub struct RateLimitedService {
    gate: AuthorizationGate,
    accounts: Arc<dyn AccountStore>,
    usage: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    window: SlidingWindow,
    metrics: MetricsCollector,
}

impl RateLimitedService {
    pub fn new(
        gate: AuthorizationGate,
        accounts: Arc<dyn AccountStore>,
        usage: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
        window: SlidingWindow,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            gate,
            accounts,
            usage,
            clock,
            window,
            metrics,
        }
    }

    pub fn window(&self) -> SlidingWindow {
        self.window
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub async fn authorize(&self, key: &str) -> Result<()> {
        let decision = self.gate.evaluate(key, false, self.window).await;
        self.settle(key, decision).await
    }

    pub async fn authorize_admin(&self, key: &str) -> Result<()> {
        let decision = self.gate.evaluate(key, true, self.window).await;
        self.settle(key, decision).await
    }

    async fn settle(&self, key: &str, decision: AuthorizationDecision) -> Result<()> {
        self.metrics.record_decision(key, &decision).await;

        match decision.reason {
            DecisionReason::Granted => Ok(()),
            DecisionReason::MissingKey => Err(KeygateError::MissingKey),
            DecisionReason::NotAuthorized => Err(KeygateError::NotAuthorized),
            DecisionReason::QuotaExceeded => Err(KeygateError::QuotaExceeded),
        }
    }

    pub async fn get_account(&self, caller: &str, account_key: &str) -> Result<Account> {
        self.authorize_admin(caller).await?;
        Ok(self.accounts.lookup(account_key).await?)
    }

    pub async fn create_account(&self, caller: &str, new_account: NewAccount) -> Result<Account> {
        self.authorize_admin(caller).await?;
        new_account
            .validate()
            .map_err(|e| KeygateError::ValidationError(e.to_string()))?;

        let account = Account::from(new_account);
        self.accounts.insert(account.clone()).await?;
        info!(account = %account.name, is_admin = account.is_admin, "Account created");
        Ok(account)
    }

    pub async fn delete_account(&self, caller: &str, account_key: &str) -> Result<()> {
        self.authorize_admin(caller).await?;
        self.accounts.remove(account_key).await?;
        info!("Account deleted");
        Ok(())
    }

    /// Decision counters for one account. Keys without decisions yet report
    /// zeroes.
    pub async fn key_metrics(&self, caller: &str, account_key: &str) -> Result<GateMetrics> {
        self.authorize_admin(caller).await?;
        Ok(self
            .metrics
            .get_key_metrics(account_key)
            .await
            .unwrap_or_default())
    }

    /// Events recorded for `key` over the configured window ending now.
    pub async fn usage_count(&self, key: &str) -> Result<u64> {
        if key.is_empty() {
            return Err(KeygateError::InvalidRequest("The key is required".to_string()));
        }

        let bounds = self.window.bounds(self.clock.now_millis());
        Ok(self.usage.count_in_window(key, bounds.start, bounds.end).await?)
    }

    /// Appends a usage event for `key` outside of any authorization check.
    pub async fn record_usage(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(KeygateError::InvalidRequest("The key is required".to_string()));
        }

        self.usage
            .record(key, self.clock.now_millis())
            .await
            .map_err(|e| {
                warn!(error = %e, "Manual usage record failed");
                KeygateError::from(e)
            })
    }

    /// Seed an admin account if none exists for `key`.
    pub async fn bootstrap_admin(&self, key: &str) -> Result<()> {
        let admin = Account::new(key, "bootstrap-admin", true, RequestQuota::Unlimited);
        match self.accounts.insert(admin).await {
            Ok(()) => {
                info!("Bootstrap admin account created");
                Ok(())
            }
            Err(DirectoryError::AlreadyExists) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::directory::{AccountDirectory, InMemoryAccountDirectory};
    use crate::gate::GateConfig;
    use crate::usage::InMemoryUsageStore;

    fn service() -> (RateLimitedService, Arc<InMemoryUsageStore>, InMemoryAccountDirectory) {
        let directory = InMemoryAccountDirectory::with_accounts([
            Account::new("admin", "root", true, RequestQuota::Unlimited),
            Account::new("user", "plain", false, RequestQuota::Limited(1)),
        ]);
        let usage = Arc::new(InMemoryUsageStore::new());
        let clock = Arc::new(ManualClock::new(500_000));
        let accounts: Arc<dyn AccountStore> = Arc::new(directory.clone());
        let directory_view: Arc<dyn AccountDirectory> = Arc::new(directory.clone());

        let gate = AuthorizationGate::new(directory_view, usage.clone(), clock.clone(), GateConfig::default())
            .unwrap();
        let service = RateLimitedService::new(
            gate,
            accounts,
            usage.clone(),
            clock,
            SlidingWindow::from_millis(60_000),
            MetricsCollector::new(),
        );
        (service, usage, directory)
    }

    #[tokio::test]
    async fn test_decisions_become_errors() {
        let (service, _, _) = service();

        assert!(service.authorize("user").await.is_ok());
        assert!(matches!(service.authorize("user").await, Err(KeygateError::QuotaExceeded)));
        assert!(matches!(service.authorize("").await, Err(KeygateError::MissingKey)));
        assert!(matches!(service.authorize("ghost").await, Err(KeygateError::NotAuthorized)));
        assert!(matches!(service.authorize_admin("user").await, Err(KeygateError::NotAuthorized)));
        assert!(service.authorize_admin("admin").await.is_ok());
    }

    #[tokio::test]
    async fn test_registry_requires_admin() {
        let (service, _, directory) = service();
        let new = NewAccount {
            key: "fresh".into(),
            name: "Fresh".into(),
            is_admin: false,
            request_quota: 10,
        };

        let denied = service.create_account("user", new.clone()).await;
        assert!(matches!(denied, Err(KeygateError::NotAuthorized)));
        assert_eq!(directory.lookup("fresh").await, Err(DirectoryError::NotFound));

        let created = service.create_account("admin", new).await.unwrap();
        assert_eq!(created.request_quota, RequestQuota::Limited(10));
        assert_eq!(service.get_account("admin", "fresh").await.unwrap(), created);

        service.delete_account("admin", "fresh").await.unwrap();
        assert!(matches!(
            service.get_account("admin", "fresh").await,
            Err(KeygateError::Directory(DirectoryError::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_payload() {
        let (service, _, _) = service();
        let new = NewAccount {
            key: "bad".into(),
            name: String::new(),
            is_admin: false,
            request_quota: -1,
        };

        assert!(matches!(
            service.create_account("admin", new).await,
            Err(KeygateError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_key_metrics_require_admin() {
        let (service, _, _) = service();

        service.authorize("user").await.unwrap();
        let _ = service.authorize("user").await;
        for i in 0..100 {
            let _ = service.authorize(&format!("random-{}", i)).await;
        }

        assert!(matches!(
            service.key_metrics("user", "user").await,
            Err(KeygateError::NotAuthorized)
        ));

        let user = service.key_metrics("admin", "user").await.unwrap();
        assert_eq!(user.allowed_requests, 1);
        assert_eq!(user.quota_exceeded, 1);

        let unknown = service.key_metrics("admin", "random-1").await.unwrap();
        assert_eq!(unknown.total_requests, 0);
    }

    #[tokio::test]
    async fn test_request_counter_operations() {
        let (service, usage, _) = service();

        service.record_usage("anything").await.unwrap();
        service.record_usage("anything").await.unwrap();
        assert_eq!(service.usage_count("anything").await.unwrap(), 2);
        assert_eq!(usage.total_events("anything").await, 2);
        assert!(matches!(service.usage_count("").await, Err(KeygateError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_is_idempotent() {
        let (service, _, directory) = service();

        service.bootstrap_admin("seed").await.unwrap();
        service.bootstrap_admin("seed").await.unwrap();
        assert!(directory.lookup("seed").await.unwrap().is_admin);

        // An existing account keeps its flags.
        service.bootstrap_admin("user").await.unwrap();
        assert!(!directory.lookup("user").await.unwrap().is_admin);
    }
}
