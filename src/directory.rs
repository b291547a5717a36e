//! Account directory: resolves API keys to account metadata.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::account::Account;
use crate::algorithms::RequestQuota;
use crate::error::DirectoryError;
use crate::key_generator::KeyGenerator;
use crate::redis::RedisClient;

/// Read side used by the authorization gate.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Resolve `key` to its account. No side effects.
    async fn lookup(&self, key: &str) -> Result<Account, DirectoryError>;
}

/// Registry operations on top of the read side.
#[async_trait]
pub trait AccountStore: AccountDirectory {
    async fn insert(&self, account: Account) -> Result<(), DirectoryError>;

    async fn remove(&self, key: &str) -> Result<(), DirectoryError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryAccountDirectory {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.key.clone(), account))
            .collect();

        Self {
            accounts: Arc::new(RwLock::new(accounts)),
        }
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn lookup(&self, key: &str) -> Result<Account, DirectoryError> {
        self.accounts
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountDirectory {
    async fn insert(&self, account: Account) -> Result<(), DirectoryError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.key) {
            return Err(DirectoryError::AlreadyExists);
        }
        accounts.insert(account.key.clone(), account);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DirectoryError> {
        self.accounts
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or(DirectoryError::NotFound)
    }
}

const INSERT_ACCOUNT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'name', ARGV[1], 'is_admin', ARGV[2], 'request_quota', ARGV[3])
return 1
"#;

/// Accounts stored as one Redis hash per API key.
pub struct RedisAccountDirectory {
    redis: Arc<RedisClient>,
    keys: KeyGenerator,
}

impl RedisAccountDirectory {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self {
            redis,
            keys: KeyGenerator::default(),
        }
    }

    fn parse_account(key: &str, fields: &HashMap<String, String>) -> Result<Account, DirectoryError> {
        let name = fields
            .get("name")
            .cloned()
            .ok_or_else(|| DirectoryError::LookupFailed(format!("account {} has no name", key)))?;

        let is_admin = matches!(
            fields.get("is_admin").map(String::as_str),
            Some("1") | Some("true")
        );

        let request_quota = fields
            .get("request_quota")
            .ok_or_else(|| DirectoryError::LookupFailed(format!("account {} has no quota", key)))?
            .parse::<i64>()
            .map(RequestQuota::from)
            .map_err(|e| {
                DirectoryError::LookupFailed(format!("account {} has a malformed quota: {}", key, e))
            })?;

        Ok(Account::new(key, name, is_admin, request_quota))
    }
}

#[async_trait]
impl AccountDirectory for RedisAccountDirectory {
    async fn lookup(&self, key: &str) -> Result<Account, DirectoryError> {
        let fields = self
            .redis
            .hgetall(&self.keys.account_key(key))
            .await
            .map_err(|e| DirectoryError::LookupFailed(e.to_string()))?;

        if fields.is_empty() {
            return Err(DirectoryError::NotFound);
        }

        Self::parse_account(key, &fields)
    }
}

#[async_trait]
impl AccountStore for RedisAccountDirectory {
    async fn insert(&self, account: Account) -> Result<(), DirectoryError> {
        let storage_key = self.keys.account_key(&account.key);
        let args = [
            account.name.clone(),
            if account.is_admin { "1" } else { "0" }.to_string(),
            i64::from(account.request_quota).to_string(),
        ];

        let inserted: i64 = self
            .redis
            .eval_script(INSERT_ACCOUNT_SCRIPT, &[storage_key.as_str()], &args)
            .await
            .map_err(|e| DirectoryError::WriteFailed(e.to_string()))?;

        if inserted == 0 {
            return Err(DirectoryError::AlreadyExists);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), DirectoryError> {
        let deleted = self
            .redis
            .delete(&self.keys.account_key(key))
            .await
            .map_err(|e| DirectoryError::WriteFailed(e.to_string()))?;

        if deleted {
            Ok(())
        } else {
            Err(DirectoryError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_unknown_key() {
        let directory = InMemoryAccountDirectory::new();
        assert_eq!(directory.lookup("nope").await, Err(DirectoryError::NotFound));
    }

    #[tokio::test]
    async fn test_insert_lookup_remove() {
        let directory = InMemoryAccountDirectory::new();
        let account = Account::new("k1", "first", false, RequestQuota::Limited(2));

        directory.insert(account.clone()).await.unwrap();
        assert_eq!(directory.lookup("k1").await.unwrap(), account);
        assert_eq!(
            directory.insert(account).await,
            Err(DirectoryError::AlreadyExists)
        );

        directory.remove("k1").await.unwrap();
        assert_eq!(directory.remove("k1").await, Err(DirectoryError::NotFound));
        assert_eq!(directory.lookup("k1").await, Err(DirectoryError::NotFound));
    }

    #[test]
    fn test_parse_redis_hash() {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), "acme".to_string());
        fields.insert("is_admin".to_string(), "1".to_string());
        fields.insert("request_quota".to_string(), "-1".to_string());

        let account = RedisAccountDirectory::parse_account("k", &fields).unwrap();
        assert!(account.is_admin);
        assert_eq!(account.request_quota, RequestQuota::Unlimited);
    }

    #[test]
    fn test_parse_redis_hash_with_bad_quota() {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), "acme".to_string());
        fields.insert("request_quota".to_string(), "lots".to_string());

        assert!(matches!(
            RedisAccountDirectory::parse_account("k", &fields),
            Err(DirectoryError::LookupFailed(_))
        ));
    }

    #[test]
    fn test_parse_redis_hash_without_quota_fails_closed() {
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), "acme".to_string());
        fields.insert("is_admin".to_string(), "0".to_string());

        assert!(matches!(
            RedisAccountDirectory::parse_account("k", &fields),
            Err(DirectoryError::LookupFailed(_))
        ));
    }
}
