//! Authorization gate.
//!
//! One call walks `START -> LOOKUP -> EVALUATE -> {ALLOW, DENY} -> RECORD`:
//! the account lookup and the window count run concurrently, any failure in
//! either collapses to a generic `NotAuthorized` denial, and an allowed call
//! appends exactly one usage event.
//!
//! Quotas are best effort by default. Two calls racing at the boundary can
//! read the same count and both pass, so a key may overshoot its quota by
//! the number of racing calls minus one. `QuotaMode::Strict` closes that gap
//! on stores with an atomic acquire.

use serde::Serialize;
use std::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::algorithms::{apply_policy, DecisionReason, QuotaMode, RequestQuota, SlidingWindow};
use crate::clock::Clock;
use crate::directory::AccountDirectory;
use crate::error::KeygateError;
use crate::usage::UsageStore;

/// Outcome of one gate evaluation. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthorizationDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
    /// False when the call was allowed but the usage event could not be
    /// stored.
    pub usage_recorded: bool,
}

impl AuthorizationDecision {
    fn allow(usage_recorded: bool) -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::Granted,
            usage_recorded,
        }
    }

    fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
            usage_recorded: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GateConfig {
    pub mode: QuotaMode,
    /// Upper bound on the lookup/count phase. `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct AuthorizationGate {
    directory: Arc<dyn AccountDirectory>,
    usage: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    config: GateConfig,
}

impl AuthorizationGate {
    pub fn new(
        directory: Arc<dyn AccountDirectory>,
        usage: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
        config: GateConfig,
    ) -> Result<Self, KeygateError> {
        if config.mode == QuotaMode::Strict && !usage.supports_atomic_acquire() {
            return Err(KeygateError::Configuration(format!(
                "strict quota mode needs an atomic acquire, which the {} usage store lacks",
                usage.backend_name()
            )));
        }

        Ok(Self {
            directory,
            usage,
            clock,
            config,
        })
    }

    pub fn mode(&self) -> QuotaMode {
        self.config.mode
    }

    pub async fn evaluate(
        &self,
        key: &str,
        require_admin: bool,
        window: SlidingWindow,
    ) -> AuthorizationDecision {
        self.evaluate_until(key, require_admin, window, future::pending())
            .await
    }

    /// Same as [`evaluate`](Self::evaluate), but gives up with a
    /// `NotAuthorized` denial if `cancelled` resolves while the lookup or
    /// count is still in flight. In-flight fetches are dropped.
    ///
    /// Writes are never abandoned: once the record or the strict-mode acquire
    /// has started, it runs to completion and its outcome decides the call.
    pub async fn evaluate_until<C>(
        &self,
        key: &str,
        require_admin: bool,
        window: SlidingWindow,
        cancelled: C,
    ) -> AuthorizationDecision
    where
        C: Future<Output = ()>,
    {
        if key.is_empty() {
            debug!("Denying request without an API key");
            return AuthorizationDecision::deny(DecisionReason::MissingKey);
        }

        let now = self.clock.now_millis();
        tokio::pin!(cancelled);

        let decision = match self.config.mode {
            QuotaMode::BestEffort => {
                self.evaluate_best_effort(key, require_admin, window, now, cancelled)
                    .await
            }
            QuotaMode::Strict => {
                self.evaluate_strict(key, require_admin, window, now, cancelled)
                    .await
            }
        };

        debug!(
            allowed = decision.allowed,
            reason = ?decision.reason,
            require_admin,
            "Authorization evaluated"
        );
        decision
    }

    async fn evaluate_best_effort<C>(
        &self,
        key: &str,
        require_admin: bool,
        window: SlidingWindow,
        now: u64,
        cancelled: C,
    ) -> AuthorizationDecision
    where
        C: Future<Output = ()>,
    {
        let bounds = window.bounds(now);
        let fetches = async {
            tokio::join!(
                self.directory.lookup(key),
                self.usage.count_in_window(key, bounds.start, bounds.end)
            )
        };

        let (account, usage_count) = match self.race(fetches, cancelled).await {
            Some(results) => results,
            None => return AuthorizationDecision::deny(DecisionReason::NotAuthorized),
        };

        let account = match account {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "Account lookup failed, denying");
                return AuthorizationDecision::deny(DecisionReason::NotAuthorized);
            }
        };
        let usage_count = match usage_count {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Usage count failed, denying");
                return AuthorizationDecision::deny(DecisionReason::NotAuthorized);
            }
        };

        match apply_policy(&account, require_admin, usage_count) {
            DecisionReason::Granted => AuthorizationDecision::allow(self.record(key, now).await),
            reason => AuthorizationDecision::deny(reason),
        }
    }

    async fn evaluate_strict<C>(
        &self,
        key: &str,
        require_admin: bool,
        window: SlidingWindow,
        now: u64,
        cancelled: C,
    ) -> AuthorizationDecision
    where
        C: Future<Output = ()>,
    {
        let account = match self.race(self.directory.lookup(key), cancelled).await {
            Some(Ok(account)) => account,
            Some(Err(e)) => {
                warn!(error = %e, "Account lookup failed, denying");
                return AuthorizationDecision::deny(DecisionReason::NotAuthorized);
            }
            None => return AuthorizationDecision::deny(DecisionReason::NotAuthorized),
        };

        if require_admin && !account.is_admin {
            return AuthorizationDecision::deny(DecisionReason::NotAuthorized);
        }

        let limit = match account.request_quota {
            RequestQuota::Unlimited => {
                return AuthorizationDecision::allow(self.record(key, now).await);
            }
            RequestQuota::Limited(limit) => limit,
        };

        // Not raced: the acquire records as part of its atomic step.
        let bounds = window.bounds(now);
        match self.usage.acquire(key, bounds.start, now, limit).await {
            Ok(true) => AuthorizationDecision::allow(true),
            Ok(false) => AuthorizationDecision::deny(DecisionReason::QuotaExceeded),
            Err(e) => {
                warn!(error = %e, "Atomic usage acquire failed, denying");
                AuthorizationDecision::deny(DecisionReason::NotAuthorized)
            }
        }
    }

    /// Drive `fetch` unless the caller cancels or the fetch timeout elapses
    /// first. `None` means the fetch was abandoned.
    async fn race<F, C>(&self, fetch: F, cancelled: C) -> Option<F::Output>
    where
        F: Future,
        C: Future<Output = ()>,
    {
        let bounded = async {
            match self.config.fetch_timeout {
                Some(limit) => tokio::time::timeout(limit, fetch).await.ok(),
                None => Some(fetch.await),
            }
        };

        tokio::select! {
            output = bounded => {
                if output.is_none() {
                    warn!("Authorization fetch timed out, denying");
                }
                output
            }
            _ = cancelled => {
                debug!("Authorization cancelled by caller, denying");
                None
            }
        }
    }

    /// Record failures never overturn an allow; they are only reported.
    async fn record(&self, key: &str, now: u64) -> bool {
        match self.usage.record(key, now).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    error = %e,
                    backend = self.usage.backend_name(),
                    "Usage event lost after allowing request"
                );
                false
            }
        }
    }
}
