use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::algorithms::RequestQuota;

/// Account metadata resolved from an API key.
///
/// A fresh snapshot is fetched for every authorization call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    pub request_quota: RequestQuota,
}

impl Account {
    pub fn new(
        key: impl Into<String>,
        name: impl Into<String>,
        is_admin: bool,
        request_quota: RequestQuota,
    ) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            is_admin,
            request_quota,
        }
    }
}

/// Payload for registering an account.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewAccount {
    #[validate(length(min = 1, max = 256, message = "key must be 1 to 256 characters"))]
    pub key: String,
    #[validate(length(min = 1, max = 256, message = "name must be 1 to 256 characters"))]
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "unlimited")]
    #[validate(range(min = -1, message = "request_quota must be -1 or a non-negative integer"))]
    pub request_quota: i64,
}

fn unlimited() -> i64 {
    -1
}

impl From<NewAccount> for Account {
    fn from(new: NewAccount) -> Self {
        Account::new(new.key, new.name, new.is_admin, RequestQuota::from(new.request_quota))
    }
}
