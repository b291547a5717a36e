//! Quota policy used by the authorization gate
//!
//! The sliding window decides which recorded events count against an
//! account, and the policy in this module decides what that count means
//! for the request being evaluated.

pub mod sliding_window;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::account::Account;

pub use sliding_window::{SlidingWindow, WindowBounds};

/// Maximum number of usage events an account may have inside the window.
///
/// On the wire a quota is an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum RequestQuota {
    Unlimited,
    Limited(u64),
}

impl From<i64> for RequestQuota {
    fn from(value: i64) -> Self {
        if value < 0 {
            RequestQuota::Unlimited
        } else {
            RequestQuota::Limited(value as u64)
        }
    }
}

impl From<RequestQuota> for i64 {
    fn from(quota: RequestQuota) -> Self {
        match quota {
            RequestQuota::Unlimited => -1,
            RequestQuota::Limited(limit) => i64::try_from(limit).unwrap_or(i64::MAX),
        }
    }
}

impl RequestQuota {
    /// Whether one more request fits on top of `prior_usage`.
    pub fn admits(&self, prior_usage: u64) -> bool {
        match self {
            RequestQuota::Unlimited => true,
            RequestQuota::Limited(limit) => prior_usage.saturating_add(1) <= *limit,
        }
    }
}

/// How the gate enforces quotas against concurrent callers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuotaMode {
    /// Count and lookup race each other, then the event is recorded.
    /// Concurrent requests near the limit may all pass.
    #[default]
    BestEffort,
    /// Count and record happen in one atomic store operation.
    Strict,
}

impl FromStr for QuotaMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" => Ok(QuotaMode::BestEffort),
            "strict" => Ok(QuotaMode::Strict),
            other => Err(format!(
                "unknown quota mode '{}', expected 'best-effort' or 'strict'",
                other
            )),
        }
    }
}

impl fmt::Display for QuotaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaMode::BestEffort => write!(f, "best-effort"),
            QuotaMode::Strict => write!(f, "strict"),
        }
    }
}

/// Why the gate allowed or denied a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Granted,
    MissingKey,
    NotAuthorized,
    QuotaExceeded,
}

/// Applies the admin and quota rules to an account that was found.
pub fn apply_policy(account: &Account, require_admin: bool, prior_usage: u64) -> DecisionReason {
    if require_admin && !account.is_admin {
        return DecisionReason::NotAuthorized;
    }

    if !account.request_quota.admits(prior_usage) {
        return DecisionReason::QuotaExceeded;
    }

    DecisionReason::Granted
}
